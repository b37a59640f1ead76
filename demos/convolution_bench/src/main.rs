use argh::FromArgs;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

use tessel::conv::{
    compare::compare,
    config::{DEFAULT_SIGMA, DEFAULT_TOLERANCE},
    device::DeviceConfig,
    dispatch::launch_convolution,
    filter::gaussian_kernel_2d,
    naive::naive_convolution,
    parallel::ExecutionStrategy,
};
use tessel::image::{Image, ImageSize};

#[derive(FromArgs, Debug)]
/// Blur a random image with the naive and the tiled convolution and compare them
struct Args {
    /// number of image rows
    #[argh(option, short = 'r', default = "1024")]
    rows: usize,

    /// number of image columns
    #[argh(option, short = 'c', default = "1024")]
    cols: usize,

    /// odd side length of the gaussian filter
    #[argh(option, short = 'k', default = "5")]
    filter_size: usize,

    /// standard deviation of the gaussian filter
    #[argh(option, short = 's', default = "DEFAULT_SIGMA")]
    sigma: f32,

    /// seed for the random image, random when not set
    #[argh(option)]
    seed: Option<u64>,

    /// number of device threads, one per core when not set
    #[argh(option, short = 'n')]
    num_threads: Option<usize>,

    /// number of timed runs of each algorithm, the best one is reported
    #[argh(option, short = 'i', default = "3")]
    iterations: usize,
}

fn random_image(
    size: ImageSize,
    seed: Option<u64>,
) -> Result<Image<f32>, Box<dyn std::error::Error>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let data = (0..size.numel()).map(|_| rng.random::<f32>()).collect();
    Ok(Image::new(size, data)?)
}

fn megapixels_per_second(num_pixels: usize, elapsed: Duration) -> f64 {
    num_pixels as f64 / elapsed.as_secs_f64() / 1e6
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();
    let iterations = args.iterations.max(1);
    let size = ImageSize {
        width: args.cols,
        height: args.rows,
    };

    log::info!(
        "🚀 blurring a {}x{} image with a {}x{} gaussian (sigma {})",
        args.rows,
        args.cols,
        args.filter_size,
        args.filter_size,
        args.sigma
    );

    // generate the host data
    let image = random_image(size, args.seed)?;
    let filter = gaussian_kernel_2d(args.filter_size, args.sigma)?;

    // naive reference on the host
    let mut naive = Image::from_size_val(size, 0.0)?;
    let mut naive_time = Duration::MAX;
    for _ in 0..iterations {
        let t0 = Instant::now();
        naive_convolution(&image, &mut naive, &filter, ExecutionStrategy::ParallelRows)?;
        naive_time = naive_time.min(t0.elapsed());
    }

    // transfer to the device
    let mut config = DeviceConfig::new();
    if let Some(num_threads) = args.num_threads {
        config = config.with_num_threads(num_threads);
    }
    let device = config.build()?;
    log::debug!("using {device:?}");

    let input = device.upload(&image);
    let weights = device.upload_slice(filter.as_slice());

    // the timer only stops once the launch has been synchronized
    let mut output = device.alloc_zeroed(image.numel());
    let mut tiled_time = Duration::MAX;
    for _ in 0..iterations {
        let t0 = Instant::now();
        let pending = launch_convolution(
            &device,
            output,
            &input,
            &weights,
            args.rows,
            args.cols,
            args.filter_size,
        )?;
        output = pending.synchronize()?;
        tiled_time = tiled_time.min(t0.elapsed());
    }

    let tiled = device.download(&output, size)?;
    let report = compare(&naive, &tiled, DEFAULT_TOLERANCE)?;

    log::info!(
        "naive: {:?} ({:.1} Mpix/s)",
        naive_time,
        megapixels_per_second(image.numel(), naive_time)
    );
    log::info!(
        "tiled: {:?} ({:.1} Mpix/s) on {} threads",
        tiled_time,
        megapixels_per_second(image.numel(), tiled_time),
        device.num_threads()
    );
    log::info!(
        "speed-up: {:.2}x",
        naive_time.as_secs_f64() / tiled_time.as_secs_f64()
    );

    if !report.passed() {
        log::error!("tiled output differs from the reference: {report}");
        return Err(format!("comparison failed: {report}").into());
    }

    log::info!("✅ outputs match: {report}");

    Ok(())
}

use approx::assert_abs_diff_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use tessel_conv::compare::compare;
use tessel_conv::config::{DEFAULT_TOLERANCE, MAX_FILTER_SIZE, TILE_SIZE};
use tessel_conv::device::{Device, DeviceConfig};
use tessel_conv::dispatch::{launch_convolution, run_convolution};
use tessel_conv::filter::{gaussian_kernel_2d, Filter};
use tessel_conv::naive::naive_convolution;
use tessel_conv::parallel::ExecutionStrategy;
use tessel_conv::tiled::tiled_convolution;
use tessel_conv::ConvolutionError;
use tessel_image::{Image, ImageSize};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_image(rng: &mut StdRng, size: ImageSize) -> Image<f32> {
    let data = (0..size.numel()).map(|_| rng.random::<f32>()).collect();
    Image::new(size, data).expect("valid image size")
}

fn random_filter(rng: &mut StdRng, filter_size: usize) -> Filter {
    let mut weights = (0..filter_size * filter_size)
        .map(|_| rng.random::<f32>())
        .collect::<Vec<_>>();
    let sum = weights.iter().sum::<f32>();
    weights.iter_mut().for_each(|w| *w /= sum);
    Filter::new(filter_size, weights).expect("valid filter")
}

fn test_device() -> Device {
    DeviceConfig::new()
        .with_num_threads(4)
        .build()
        .expect("device builds")
}

fn device_convolution(
    device: &Device,
    src: &Image<f32>,
    filter: &Filter,
) -> Result<Image<f32>, ConvolutionError> {
    let input = device.upload(src);
    let weights = device.upload_slice(filter.as_slice());
    let output = device.alloc_zeroed(src.numel());
    let output = run_convolution(
        device,
        output,
        &input,
        &weights,
        src.rows(),
        src.cols(),
        filter.size(),
    )?;
    device.download(&output, src.size())
}

#[test]
fn tiled_matches_naive_on_random_inputs() -> Result<(), ConvolutionError> {
    init_logger();
    let mut rng = StdRng::seed_from_u64(0x7e55e1);
    let device = test_device();

    let sizes = [
        [1, 1],
        [3, 3],
        [TILE_SIZE, TILE_SIZE],
        [TILE_SIZE + 1, TILE_SIZE - 1],
        [5, 40],
        [37, 2],
        [64, 48],
        [100, 73],
    ];

    for size in sizes {
        let src = random_image(&mut rng, size.into());
        for filter_size in (1..=MAX_FILTER_SIZE).step_by(2) {
            let filter = random_filter(&mut rng, filter_size);

            let mut expected = Image::from_size_val(src.size(), 0.0)?;
            naive_convolution(&src, &mut expected, &filter, ExecutionStrategy::ParallelRows)?;

            let mut tiled = Image::from_size_val(src.size(), 0.0)?;
            tiled_convolution(&src, &mut tiled, &filter)?;
            let report = compare(&expected, &tiled, DEFAULT_TOLERANCE)?;
            assert!(report.passed(), "{size:?} filter {filter_size}: {report}");

            let on_device = device_convolution(&device, &src, &filter)?;
            let report = compare(&expected, &on_device, DEFAULT_TOLERANCE)?;
            assert!(report.passed(), "{size:?} filter {filter_size}: {report}");
        }
    }
    Ok(())
}

#[test]
fn constant_three_by_three_image_stays_constant() -> Result<(), ConvolutionError> {
    let src = Image::from_size_val([3, 3].into(), 5.0)?;
    let filter = gaussian_kernel_2d(3, 1.5)?;
    let device = test_device();

    let out = device_convolution(&device, &src, &filter)?;

    for &v in out.as_slice() {
        assert_abs_diff_eq!(v, 5.0, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn border_replicates_nearest_edge_pixel() -> Result<(), ConvolutionError> {
    // unnormalized all-ones filter on a single pixel: every tap reads the same pixel
    let src = Image::new([1, 1].into(), vec![0.5])?;
    let filter = Filter::new(5, vec![1.0; 25])?;

    let mut out = Image::from_size_val(src.size(), 0.0)?;
    tiled_convolution(&src, &mut out, &filter)?;
    assert_abs_diff_eq!(out.as_slice()[0], 12.5, epsilon = 1e-5);

    // a vertical step edge: the left column sees two extra copies of itself
    #[rustfmt::skip]
    let src = Image::new(
        [3, 2].into(),
        vec![
            1.0, 0.0, 0.0,
            1.0, 0.0, 0.0,
        ],
    )?;
    let filter = Filter::new(3, vec![1.0; 9])?;
    let mut out = Image::from_size_val(src.size(), 0.0)?;
    tiled_convolution(&src, &mut out, &filter)?;
    assert_eq!(out.as_slice(), &[6.0, 3.0, 0.0, 6.0, 3.0, 0.0]);
    Ok(())
}

#[test]
fn gaussian_filters_are_normalized() -> Result<(), ConvolutionError> {
    for filter_size in (1..=MAX_FILTER_SIZE).step_by(2) {
        for sigma in [0.3, 1.0, 1.5, 3.0, 10.0] {
            let filter = gaussian_kernel_2d(filter_size, sigma)?;
            assert_abs_diff_eq!(filter.sum(), 1.0, epsilon = 1e-5);
        }
    }
    Ok(())
}

#[test]
fn identity_filter_reproduces_input() -> Result<(), ConvolutionError> {
    let mut rng = StdRng::seed_from_u64(7);
    let device = test_device();
    let src = random_image(&mut rng, [45, 29].into());

    for filter_size in [1, 3, 9, MAX_FILTER_SIZE] {
        let out = device_convolution(&device, &src, &Filter::identity(filter_size)?)?;
        assert_eq!(out.as_slice(), src.as_slice());
    }
    Ok(())
}

#[test]
fn constant_image_is_invariant() -> Result<(), ConvolutionError> {
    let mut rng = StdRng::seed_from_u64(11);
    let device = test_device();

    for size in [[2, 7], [16, 16], [33, 50]] {
        let value = rng.random_range(-10.0..10.0f32);
        let src = Image::from_size_val(size.into(), value)?;
        for filter_size in [3, 7, 13] {
            let filter = gaussian_kernel_2d(filter_size, 2.0)?;
            let out = device_convolution(&device, &src, &filter)?;
            for &v in out.as_slice() {
                assert_abs_diff_eq!(v, value, epsilon = 1e-4 * value.abs().max(1.0));
            }
        }
    }
    Ok(())
}

#[test]
fn repeated_runs_are_bit_identical() -> Result<(), ConvolutionError> {
    let mut rng = StdRng::seed_from_u64(3);
    let src = random_image(&mut rng, [130, 70].into());
    let filter = gaussian_kernel_2d(9, 1.5)?;

    let first = device_convolution(&test_device(), &src, &filter)?;
    for num_threads in [1, 2, 8] {
        let device = DeviceConfig::new().with_num_threads(num_threads).build()?;
        let again = device_convolution(&device, &src, &filter)?;
        assert_eq!(first.as_slice(), again.as_slice());
    }
    Ok(())
}

#[test]
fn ones_image_with_gaussian_scenario() -> Result<(), ConvolutionError> {
    let src = Image::from_size_val([4, 4].into(), 1.0)?;
    let filter = gaussian_kernel_2d(3, 1.5)?;

    let out = device_convolution(&test_device(), &src, &filter)?;

    assert_eq!(out.size(), src.size());
    for &v in out.as_slice() {
        assert_abs_diff_eq!(v, 1.0, epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn concurrent_launches_complete_independently() -> Result<(), ConvolutionError> {
    let mut rng = StdRng::seed_from_u64(99);
    let device = test_device();
    let filter = gaussian_kernel_2d(5, 1.5)?;
    let weights = device.upload_slice(filter.as_slice());

    let images = (0..4)
        .map(|i| random_image(&mut rng, [20 + i, 31 - i].into()))
        .collect::<Vec<_>>();

    // queue every launch before waiting on any of them
    let pending = images
        .iter()
        .map(|src| {
            let input = device.upload(src);
            let output = device.alloc_zeroed(src.numel());
            launch_convolution(
                &device,
                output,
                &input,
                &weights,
                src.rows(),
                src.cols(),
                filter.size(),
            )
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (src, launch) in images.iter().zip(pending) {
        let out = device.download(&launch.synchronize()?, src.size())?;
        let mut expected = Image::from_size_val(src.size(), 0.0)?;
        naive_convolution(src, &mut expected, &filter, ExecutionStrategy::Serial)?;
        assert!(compare(&expected, &out, DEFAULT_TOLERANCE)?.passed());
    }
    Ok(())
}

#[test]
fn invalid_filters_are_rejected_before_dispatch() -> Result<(), ConvolutionError> {
    let device = test_device();
    let src = Image::from_size_val([8, 8].into(), 0.0)?;
    let input = device.upload(&src);

    let weights = device.alloc_zeroed(4);
    let res = run_convolution(&device, device.alloc_zeroed(64), &input, &weights, 8, 8, 2);
    assert!(matches!(res, Err(ConvolutionError::EvenFilterSize(2))));

    let weights = device.alloc_zeroed(TILE_SIZE * TILE_SIZE);
    let res = run_convolution(
        &device,
        device.alloc_zeroed(64),
        &input,
        &weights,
        8,
        8,
        TILE_SIZE,
    );
    assert!(matches!(res, Err(ConvolutionError::EvenFilterSize(_))));

    let weights = device.alloc_zeroed((TILE_SIZE + 1) * (TILE_SIZE + 1));
    let res = run_convolution(
        &device,
        device.alloc_zeroed(64),
        &input,
        &weights,
        8,
        8,
        TILE_SIZE + 1,
    );
    assert!(matches!(res, Err(ConvolutionError::FilterTooLarge { .. })));
    Ok(())
}

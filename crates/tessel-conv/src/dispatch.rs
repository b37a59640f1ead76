use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;

use crate::config::{SHARED_MEMORY_BYTES, TILE_SIZE};
use crate::device::{Device, DeviceBuffer, DeviceProperties};
use crate::error::{ConvolutionError, LaunchError};
use crate::filter::{validate_filter_size, Filter};
use crate::tiled::{grid_dims, run_grid};

/// Grid, group and shared memory sizes of one launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Number of work groups as `(x, y)`, i.e. `(tile columns, tile rows)`.
    pub grid_dim: (usize, usize),
    /// Number of work items per group as `(x, y)`.
    pub group_dim: (usize, usize),
    /// Bytes of fast memory each group needs.
    pub shared_memory_bytes: usize,
}

impl LaunchConfig {
    /// Configuration covering a `rows x cols` image with one group per tile.
    ///
    /// # Example
    ///
    /// ```
    /// use tessel_conv::dispatch::LaunchConfig;
    ///
    /// let cfg = LaunchConfig::for_image(20, 40);
    /// assert_eq!(cfg.grid_dim, (3, 2));
    /// assert_eq!(cfg.group_dim, (16, 16));
    /// ```
    pub fn for_image(rows: usize, cols: usize) -> Self {
        let (grid_rows, grid_cols) = grid_dims(rows, cols);
        Self {
            grid_dim: (grid_cols, grid_rows),
            group_dim: (TILE_SIZE, TILE_SIZE),
            shared_memory_bytes: SHARED_MEMORY_BYTES,
        }
    }

    /// Total number of work groups.
    pub fn num_groups(&self) -> usize {
        self.grid_dim.0 * self.grid_dim.1
    }

    /// Number of work items in one group.
    pub fn threads_per_group(&self) -> usize {
        self.group_dim.0 * self.group_dim.1
    }

    /// Check the configuration against the device limits.
    ///
    /// # Errors
    ///
    /// * [`LaunchError::InvalidConfiguration`] for an empty or oversized grid or group.
    /// * [`LaunchError::OutOfResources`] when a group needs more fast memory than available.
    pub fn validate(&self, properties: &DeviceProperties) -> Result<(), LaunchError> {
        let (grid_x, grid_y) = self.grid_dim;
        let (max_x, max_y) = properties.max_grid_dim;

        if grid_x == 0 || grid_y == 0 {
            return Err(LaunchError::InvalidConfiguration(format!(
                "empty grid {grid_x}x{grid_y}"
            )));
        }
        if grid_x > max_x || grid_y > max_y {
            return Err(LaunchError::InvalidConfiguration(format!(
                "grid {grid_x}x{grid_y} exceeds the device limit {max_x}x{max_y}"
            )));
        }

        let threads = self.threads_per_group();
        if threads == 0 || threads > properties.max_threads_per_group {
            return Err(LaunchError::InvalidConfiguration(format!(
                "{threads} work items per group, device allows 1..={}",
                properties.max_threads_per_group
            )));
        }

        if self.shared_memory_bytes > properties.max_shared_memory_bytes {
            return Err(LaunchError::OutOfResources {
                requested: self.shared_memory_bytes,
                available: properties.max_shared_memory_bytes,
            });
        }

        Ok(())
    }
}

/// A launch queued on the device.
///
/// The device runs the grid in the background; results are only available
/// through [`PendingLaunch::synchronize`]. Dropping the handle does not cancel
/// the launch.
#[must_use = "a launch must be synchronized before its output can be read"]
pub struct PendingLaunch {
    config: LaunchConfig,
    receiver: mpsc::Receiver<Result<Vec<f32>, LaunchError>>,
}

impl PendingLaunch {
    /// The configuration the grid was launched with.
    pub fn config(&self) -> &LaunchConfig {
        &self.config
    }

    /// Block until every work group has finished and return the output buffer.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::KernelPanicked`] if a work group panicked and
    /// [`LaunchError::Disconnected`] if the device dropped the launch.
    pub fn synchronize(self) -> Result<DeviceBuffer, ConvolutionError> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| LaunchError::Disconnected)
            .and_then(|res| res);

        match result {
            Ok(output) => Ok(DeviceBuffer::from_vec(output)),
            Err(err) => {
                log::error!("launch {:?} failed: {}", self.config, err);
                Err(err.into())
            }
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn check_len(buffer: &DeviceBuffer, expected: usize) -> Result<(), ConvolutionError> {
    if buffer.len() != expected {
        return Err(ConvolutionError::BufferSizeMismatch {
            expected,
            actual: buffer.len(),
        });
    }
    Ok(())
}

/// Launch the tiled convolution on the device without waiting for it.
///
/// Preconditions and the launch configuration are checked before anything is
/// queued, so a returned error means no work group ran.
///
/// # Arguments
///
/// * `device` - The device to run on.
/// * `output` - Device buffer of `rows * cols` elements, moved into the launch.
/// * `input` - Device buffer of `rows * cols` elements.
/// * `filter` - Device buffer of `filter_size²` elements.
/// * `rows` - Image height.
/// * `cols` - Image width.
/// * `filter_size` - Odd filter side length, smaller than the tile edge.
pub fn launch_convolution(
    device: &Device,
    output: DeviceBuffer,
    input: &DeviceBuffer,
    filter: &DeviceBuffer,
    rows: usize,
    cols: usize,
    filter_size: usize,
) -> Result<PendingLaunch, ConvolutionError> {
    if rows == 0 || cols == 0 {
        return Err(ConvolutionError::EmptyImage { rows, cols });
    }
    let numel = rows
        .checked_mul(cols)
        .ok_or(ConvolutionError::ImageTooLarge { rows, cols })?;
    validate_filter_size(filter_size)?;
    check_len(input, numel)?;
    check_len(&output, numel)?;
    let filter = Filter::new(filter_size, filter.as_slice().to_vec())?;

    let config = LaunchConfig::for_image(rows, cols);
    if let Err(err) = config.validate(device.properties()) {
        log::error!("rejected launch {config:?}: {err}");
        return Err(err.into());
    }

    log::debug!(
        "launching {}x{} groups of {}x{} work items for a {rows}x{cols} image, filter {filter_size}x{filter_size}",
        config.grid_dim.0,
        config.grid_dim.1,
        config.group_dim.0,
        config.group_dim.1,
    );

    let (sender, receiver) = mpsc::channel();
    let input = input.clone();

    device.spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut dst = output.into_vec();
            run_grid(input.as_slice(), &mut dst, rows, cols, &filter);
            dst
        }))
        .map_err(|payload| LaunchError::KernelPanicked(panic_message(payload)));

        // the caller may have dropped the handle, nobody to report to then
        let _ = sender.send(result);
    });

    Ok(PendingLaunch { config, receiver })
}

/// Launch the tiled convolution and block until it completes.
///
/// # Example
///
/// ```
/// use tessel_image::Image;
/// use tessel_conv::{device::DeviceConfig, dispatch::run_convolution, filter::gaussian_kernel_2d};
///
/// let device = DeviceConfig::new().with_num_threads(2).build().unwrap();
/// let image = Image::from_size_val([4, 4].into(), 1.0).unwrap();
/// let filter = gaussian_kernel_2d(3, 1.5).unwrap();
///
/// let input = device.upload(&image);
/// let weights = device.upload_slice(filter.as_slice());
/// let output = device.alloc_zeroed(image.numel());
///
/// let output = run_convolution(&device, output, &input, &weights, 4, 4, 3).unwrap();
/// let blurred = device.download(&output, image.size()).unwrap();
/// assert!(blurred.as_slice().iter().all(|v| (v - 1.0).abs() < 1e-6));
/// ```
pub fn run_convolution(
    device: &Device,
    output: DeviceBuffer,
    input: &DeviceBuffer,
    filter: &DeviceBuffer,
    rows: usize,
    cols: usize,
    filter_size: usize,
) -> Result<DeviceBuffer, ConvolutionError> {
    launch_convolution(device, output, input, filter, rows, cols, filter_size)?.synchronize()
}

use std::sync::Arc;

use tessel_image::{Image, ImageSize};

use crate::config::{SHARED_MEMORY_BYTES, TILE_SIZE};
use crate::error::{ConvolutionError, LaunchError};

/// Limits of the compute device, checked before every launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Maximum number of work items in one work group.
    pub max_threads_per_group: usize,
    /// Bytes of fast memory available to one work group.
    pub max_shared_memory_bytes: usize,
    /// Maximum grid size as `(x, y)`, i.e. `(tile columns, tile rows)`.
    pub max_grid_dim: (usize, usize),
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            max_threads_per_group: 1024,
            max_shared_memory_bytes: 48 * 1024,
            max_grid_dim: ((1 << 31) - 1, 65535),
        }
    }
}

/// Builder for a [`Device`].
///
/// # Example
///
/// ```
/// use tessel_conv::device::DeviceConfig;
///
/// let device = DeviceConfig::new().with_num_threads(2).build().unwrap();
/// assert_eq!(device.num_threads(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeviceConfig {
    num_threads: Option<usize>,
    properties: DeviceProperties,
}

impl DeviceConfig {
    /// Create a configuration with the default device limits and thread count.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads. Rayon picks one per core by default.
    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    /// Set the maximum number of work items per group.
    pub fn with_max_threads_per_group(mut self, max_threads_per_group: usize) -> Self {
        self.properties.max_threads_per_group = max_threads_per_group;
        self
    }

    /// Set the fast memory available to one group, in bytes.
    pub fn with_max_shared_memory_bytes(mut self, max_shared_memory_bytes: usize) -> Self {
        self.properties.max_shared_memory_bytes = max_shared_memory_bytes;
        self
    }

    /// Set the maximum grid size as `(x, y)`.
    pub fn with_max_grid_dim(mut self, max_grid_dim: (usize, usize)) -> Self {
        self.properties.max_grid_dim = max_grid_dim;
        self
    }

    /// Build the device and its worker pool.
    pub fn build(self) -> Result<Device, LaunchError> {
        Device::new(self)
    }
}

/// A buffer living in device-addressable memory.
///
/// Cloning a buffer is cheap and shares the same memory.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceBuffer {
    data: Arc<Vec<f32>>,
}

impl DeviceBuffer {
    pub(crate) fn from_vec(data: Vec<f32>) -> Self {
        Self {
            data: Arc::new(data),
        }
    }

    /// Take the memory back, copying only if the buffer is still shared.
    pub(crate) fn into_vec(self) -> Vec<f32> {
        Arc::unwrap_or_clone(self.data)
    }

    /// Number of `f32` elements in the buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the buffer holds no elements.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The buffer contents.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}

/// A data-parallel compute device backed by a dedicated rayon thread pool.
///
/// Work groups of a launch are scheduled as independent tasks on the pool.
#[derive(Clone)]
pub struct Device {
    pool: Arc<rayon::ThreadPool>,
    properties: DeviceProperties,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("num_threads", &self.num_threads())
            .field("properties", &self.properties)
            .finish()
    }
}

impl Device {
    /// Create a device from its configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LaunchError::ThreadPool`] if the worker pool cannot be built.
    pub fn new(config: DeviceConfig) -> Result<Self, LaunchError> {
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("tessel-device-{i}"));
        if let Some(num_threads) = config.num_threads {
            builder = builder.num_threads(num_threads);
        }
        let pool = builder.build()?;

        log::debug!(
            "device ready: {} threads, {} work items per group, {} bytes shared memory ({} needed for {}x{} tiles)",
            pool.current_num_threads(),
            config.properties.max_threads_per_group,
            config.properties.max_shared_memory_bytes,
            SHARED_MEMORY_BYTES,
            TILE_SIZE,
            TILE_SIZE,
        );

        Ok(Self {
            pool: Arc::new(pool),
            properties: config.properties,
        })
    }

    /// The limits of this device.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Number of worker threads of the device.
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Copy an image into device memory.
    pub fn upload(&self, image: &Image<f32>) -> DeviceBuffer {
        self.upload_slice(image.as_slice())
    }

    /// Copy a host slice into device memory.
    pub fn upload_slice(&self, data: &[f32]) -> DeviceBuffer {
        DeviceBuffer::from_vec(data.to_vec())
    }

    /// Allocate a zeroed device buffer of `len` elements.
    pub fn alloc_zeroed(&self, len: usize) -> DeviceBuffer {
        DeviceBuffer::from_vec(vec![0.0; len])
    }

    /// Copy a device buffer back into a host image of the given size.
    ///
    /// # Errors
    ///
    /// Fails if the buffer length does not match `size`.
    pub fn download(
        &self,
        buffer: &DeviceBuffer,
        size: ImageSize,
    ) -> Result<Image<f32>, ConvolutionError> {
        if buffer.len() != size.numel() {
            return Err(ConvolutionError::BufferSizeMismatch {
                expected: size.numel(),
                actual: buffer.len(),
            });
        }
        Ok(Image::new(size, buffer.as_slice().to_vec())?)
    }

    /// Queue a job on the device and return immediately.
    pub(crate) fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pool.spawn(job);
    }
}

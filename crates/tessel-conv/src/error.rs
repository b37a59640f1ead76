use thiserror::Error;

/// Errors raised while configuring or running a launch on the compute device.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// The grid or work group dimensions are not valid for the device.
    #[error("invalid launch configuration: {0}")]
    InvalidConfiguration(String),

    /// The launch requests more per-group resources than the device offers.
    #[error("out of resources: requested {requested} bytes of shared memory, device offers {available}")]
    OutOfResources {
        /// Shared memory bytes requested per work group.
        requested: usize,
        /// Shared memory bytes available per work group.
        available: usize,
    },

    /// The device thread pool failed to build.
    #[error("failed to build device thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// A work group panicked while the kernel was running.
    #[error("kernel panicked: {0}")]
    KernelPanicked(String),

    /// The device dropped the launch before reporting completion.
    #[error("device disconnected before the launch completed")]
    Disconnected,
}

/// An error type for the convolution operations.
#[derive(Error, Debug)]
pub enum ConvolutionError {
    /// The filter side length must be odd.
    #[error("filter size must be odd and non-zero, got {0}")]
    EvenFilterSize(usize),

    /// The filter must be strictly smaller than the tile edge.
    #[error("filter size {size} must be smaller than the tile size {tile_size}")]
    FilterTooLarge {
        /// The requested filter side length.
        size: usize,
        /// The tile edge length.
        tile_size: usize,
    },

    /// The filter weights do not form a `size x size` square.
    #[error("filter of size {size} expects {expected} weights, got {actual}")]
    FilterLengthMismatch {
        /// The filter side length.
        size: usize,
        /// The expected number of weights.
        expected: usize,
        /// The number of weights provided.
        actual: usize,
    },

    /// The image has no pixels.
    #[error("image dimensions must be positive, got {rows}x{cols}")]
    EmptyImage {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// The number of pixels does not fit in `usize`.
    #[error("image of {rows}x{cols} pixels is too large to address")]
    ImageTooLarge {
        /// Number of rows.
        rows: usize,
        /// Number of columns.
        cols: usize,
    },

    /// A device buffer does not hold the number of elements the launch needs.
    #[error("buffer holds {actual} elements, expected {expected}")]
    BufferSizeMismatch {
        /// The expected number of elements.
        expected: usize,
        /// The actual number of elements.
        actual: usize,
    },

    /// Source and destination images differ in size.
    #[error("image size mismatch: {0}x{1} vs {2}x{3}")]
    ImageSizeMismatch(usize, usize, usize, usize),

    /// Gaussian sigma must be finite and positive.
    #[error("sigma must be finite and positive, got {0}")]
    InvalidSigma(f32),

    /// The tolerance for a comparison must be finite and non-negative.
    #[error("tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f32),

    /// Error raised by the compute device.
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Error raised by a host-side parallel loop.
    #[error(transparent)]
    Parallel(#[from] crate::parallel::ParallelError),

    /// Error raised by the image module.
    #[error("image error: {0}")]
    Image(#[from] tessel_image::ImageError),
}

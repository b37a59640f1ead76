use crate::config::{MAX_FILTER_SIZE, TILE_SIZE};
use crate::error::ConvolutionError;

/// A square convolution mask stored in row-major order.
///
/// The side length is always odd and at most [`MAX_FILTER_SIZE`], so the
/// mask has a well defined center at `(size / 2, size / 2)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    size: usize,
    weights: Vec<f32>,
}

impl Filter {
    /// Create a filter from row-major weights.
    ///
    /// # Arguments
    ///
    /// * `size` - The side length of the filter.
    /// * `weights` - `size * size` weights, row-major.
    ///
    /// # Errors
    ///
    /// Fails if `size` is even, larger than [`MAX_FILTER_SIZE`], or does not match
    /// the number of weights.
    pub fn new(size: usize, weights: Vec<f32>) -> Result<Self, ConvolutionError> {
        validate_filter_size(size)?;
        if weights.len() != size * size {
            return Err(ConvolutionError::FilterLengthMismatch {
                size,
                expected: size * size,
                actual: weights.len(),
            });
        }
        Ok(Self { size, weights })
    }

    /// A filter that is `1.0` at its center and `0.0` elsewhere.
    pub fn identity(size: usize) -> Result<Self, ConvolutionError> {
        validate_filter_size(size)?;
        let mut weights = vec![0.0; size * size];
        weights[(size / 2) * size + size / 2] = 1.0;
        Ok(Self { size, weights })
    }

    /// A normalized box filter, every weight is `1 / size²`.
    pub fn box_blur(size: usize) -> Result<Self, ConvolutionError> {
        validate_filter_size(size)?;
        let weights = vec![1.0 / (size * size) as f32; size * size];
        Ok(Self { size, weights })
    }

    /// Side length of the filter.
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Half width of the filter, `size / 2`.
    #[inline]
    pub fn radius(&self) -> usize {
        self.size / 2
    }

    /// The weights in row-major order.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    /// Weight at offset `(dr, dc)` from the center, both in `[-radius, radius]`.
    #[inline]
    pub fn weight(&self, dr: isize, dc: isize) -> f32 {
        let k = self.radius() as isize;
        self.weights[((dr + k) as usize) * self.size + (dc + k) as usize]
    }

    /// Sum of all the weights.
    pub fn sum(&self) -> f32 {
        self.weights.iter().sum()
    }
}

/// Check that a filter side length is odd, non-zero and fits the tiled kernel.
pub fn validate_filter_size(size: usize) -> Result<(), ConvolutionError> {
    if size % 2 == 0 {
        return Err(ConvolutionError::EvenFilterSize(size));
    }
    if size >= TILE_SIZE || size > MAX_FILTER_SIZE {
        return Err(ConvolutionError::FilterTooLarge {
            size,
            tile_size: TILE_SIZE,
        });
    }
    Ok(())
}

fn validate_sigma(sigma: f32) -> Result<(), ConvolutionError> {
    if !sigma.is_finite() || sigma <= 0.0 {
        return Err(ConvolutionError::InvalidSigma(sigma));
    }
    Ok(())
}

/// Create a gaussian blur kernel.
///
/// # Arguments
///
/// * `kernel_size` - The size of the kernel.
/// * `sigma` - The sigma of the gaussian kernel.
///
/// # Returns
///
/// A vector of the kernel, normalized to sum to one.
pub fn gaussian_kernel_1d(kernel_size: usize, sigma: f32) -> Result<Vec<f32>, ConvolutionError> {
    validate_filter_size(kernel_size)?;
    validate_sigma(sigma)?;

    let mean = (kernel_size - 1) as f32 / 2.0;
    let sigma_sq = sigma * sigma;

    // compute the kernel
    let mut kernel = (0..kernel_size)
        .map(|i| {
            let x = i as f32 - mean;
            (-(x * x) / (2.0 * sigma_sq)).exp()
        })
        .collect::<Vec<_>>();

    // normalize the kernel
    let norm = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|k| *k /= norm);
    Ok(kernel)
}

/// Create a normalized 2D gaussian filter.
///
/// Each weight is `exp(-(dr² + dc²) / (2σ²))` for offsets `dr, dc` from the
/// center. The raw weights and their running sum are computed in a first pass,
/// then every weight is scaled by `1 / sum`.
///
/// # Arguments
///
/// * `filter_size` - The odd side length of the filter.
/// * `sigma` - The standard deviation. Independent of `filter_size`.
///
/// # Example
///
/// ```
/// use tessel_conv::filter::gaussian_kernel_2d;
///
/// let filter = gaussian_kernel_2d(5, 1.5).unwrap();
/// assert_eq!(filter.size(), 5);
/// assert!((filter.sum() - 1.0).abs() < 1e-5);
/// ```
pub fn gaussian_kernel_2d(filter_size: usize, sigma: f32) -> Result<Filter, ConvolutionError> {
    validate_filter_size(filter_size)?;
    validate_sigma(sigma)?;

    let k = (filter_size / 2) as isize;
    let two_sigma_sq = 2.0 * sigma * sigma;

    let mut weights = Vec::with_capacity(filter_size * filter_size);
    let mut sum = 0.0f32;
    for dr in -k..=k {
        for dc in -k..=k {
            let w = (-((dr * dr + dc * dc) as f32) / two_sigma_sq).exp();
            sum += w;
            weights.push(w);
        }
    }

    let inv_sum = 1.0 / sum;
    weights.iter_mut().for_each(|w| *w *= inv_sum);

    Ok(Filter {
        size: filter_size,
        weights,
    })
}

use tessel_image::Image;

use crate::border::BorderMode;
use crate::error::ConvolutionError;
use crate::filter::{validate_filter_size, Filter};
use crate::parallel::{for_each_row, ExecutionStrategy};

/// Check the shapes shared by every convolution variant.
pub(crate) fn validate_shapes(
    src: &Image<f32>,
    dst: &Image<f32>,
    filter: &Filter,
) -> Result<(), ConvolutionError> {
    if src.rows() == 0 || src.cols() == 0 {
        return Err(ConvolutionError::EmptyImage {
            rows: src.rows(),
            cols: src.cols(),
        });
    }

    if src.size() != dst.size() {
        return Err(ConvolutionError::ImageSizeMismatch(
            src.rows(),
            src.cols(),
            dst.rows(),
            dst.cols(),
        ));
    }

    validate_filter_size(filter.size())
}

/// Convolve the pixel at `(row, col)` reading its neighbourhood straight from `src`.
///
/// Offsets are visited row-major, outer `dr` and inner `dc`, with every
/// coordinate clamped onto the image.
#[inline]
pub fn convolve_pixel(
    src: &[f32],
    rows: usize,
    cols: usize,
    filter: &Filter,
    row: usize,
    col: usize,
) -> f32 {
    let border = BorderMode::Replicate;
    let k = filter.radius() as isize;
    let weights = filter.as_slice();
    let mut sum = 0.0f32;
    let mut w = 0;
    for dr in -k..=k {
        let r = border.map_index(row as isize + dr, rows);
        let src_row = &src[r * cols..(r + 1) * cols];
        for dc in -k..=k {
            let c = border.map_index(col as isize + dc, cols);
            sum += src_row[c] * weights[w];
            w += 1;
        }
    }
    sum
}

/// Reference convolution, one output pixel per work item.
///
/// Every output pixel re-reads its full neighbourhood from the source image.
/// Out-of-range neighbours replicate the nearest border pixel.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
/// * `filter` - The square filter to apply.
/// * `strategy` - How the output rows are scheduled.
///
/// # Errors
///
/// Fails on empty images, mismatched shapes or an invalid filter size.
///
/// # Example
///
/// ```
/// use tessel_image::Image;
/// use tessel_conv::{filter::Filter, naive::naive_convolution, parallel::ExecutionStrategy};
///
/// let src = Image::new([2, 2].into(), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
/// let mut dst = Image::from_size_val(src.size(), 0.0).unwrap();
/// let filter = Filter::identity(3).unwrap();
///
/// naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::Serial).unwrap();
/// assert_eq!(dst.as_slice(), src.as_slice());
/// ```
pub fn naive_convolution(
    src: &Image<f32>,
    dst: &mut Image<f32>,
    filter: &Filter,
    strategy: ExecutionStrategy,
) -> Result<(), ConvolutionError> {
    validate_shapes(src, dst, filter)?;

    let (rows, cols) = (src.rows(), src.cols());
    let src_data = src.as_slice();

    for_each_row(strategy, dst.as_slice_mut(), cols, |r, dst_row| {
        dst_row
            .iter_mut()
            .enumerate()
            .for_each(|(c, out)| *out = convolve_pixel(src_data, rows, cols, filter, r, c));
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::gaussian_kernel_2d;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_naive_constant_image() -> Result<(), ConvolutionError> {
        let src = Image::from_size_val([3, 3].into(), 5.0)?;
        let mut dst = Image::from_size_val(src.size(), 0.0)?;
        let filter = gaussian_kernel_2d(3, 1.5)?;

        naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::Serial)?;

        for &v in dst.as_slice() {
            assert_abs_diff_eq!(v, 5.0, epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_naive_box_blur_known_values() -> Result<(), ConvolutionError> {
        #[rustfmt::skip]
        let src = Image::new(
            [3, 3].into(),
            vec![
                0.0, 0.0, 0.0,
                0.0, 9.0, 0.0,
                0.0, 0.0, 0.0,
            ],
        )?;
        let mut dst = Image::from_size_val(src.size(), 0.0)?;
        let filter = Filter::new(3, vec![1.0; 9])?;

        naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::ParallelRows)?;

        // every pixel sees the bright center exactly once
        assert_eq!(dst.as_slice(), &[9.0; 9]);
        Ok(())
    }

    #[test]
    fn test_naive_replicates_border() -> Result<(), ConvolutionError> {
        // a single pixel image sees only its own value through clamping
        let src = Image::new([1, 1].into(), vec![2.0])?;
        let mut dst = Image::from_size_val(src.size(), 0.0)?;
        let filter = Filter::new(3, vec![1.0; 9])?;

        naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::Serial)?;

        assert_eq!(dst.as_slice(), &[18.0]);
        Ok(())
    }

    #[test]
    fn test_naive_strategies_agree() -> Result<(), ConvolutionError> {
        let data = (0..35).map(|i| (i * 7 % 11) as f32).collect();
        let src = Image::new([7, 5].into(), data)?;
        let filter = gaussian_kernel_2d(5, 1.0)?;

        let mut serial = Image::from_size_val(src.size(), 0.0)?;
        naive_convolution(&src, &mut serial, &filter, ExecutionStrategy::Serial)?;

        let mut fixed = Image::from_size_val(src.size(), 0.0)?;
        naive_convolution(&src, &mut fixed, &filter, ExecutionStrategy::Fixed(3))?;

        assert_eq!(serial, fixed);
        Ok(())
    }

    #[test]
    fn test_naive_invalid_inputs() -> Result<(), ConvolutionError> {
        let filter = Filter::identity(3)?;

        let src = Image::new([0, 4].into(), vec![])?;
        let mut dst = Image::new([0, 4].into(), vec![])?;
        let res = naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::Serial);
        assert!(matches!(
            res,
            Err(ConvolutionError::EmptyImage { rows: 4, cols: 0 })
        ));

        let src = Image::from_size_val([4, 4].into(), 0.0)?;
        let mut dst = Image::from_size_val([4, 3].into(), 0.0)?;
        let res = naive_convolution(&src, &mut dst, &filter, ExecutionStrategy::Serial);
        assert!(matches!(
            res,
            Err(ConvolutionError::ImageSizeMismatch(4, 4, 3, 4))
        ));
        Ok(())
    }
}

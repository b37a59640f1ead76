use tessel_image::Image;

use crate::error::ConvolutionError;

/// First element that differs by more than the tolerance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    /// Row of the element.
    pub row: usize,
    /// Column of the element.
    pub col: usize,
    /// Value in the reference output.
    pub expected: f32,
    /// Value in the output under test.
    pub actual: f32,
}

/// Outcome of an elementwise comparison between two outputs.
///
/// A comparison that finds differences is still a successful computation; the
/// report carries the mismatch instead of an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparisonReport {
    /// Absolute tolerance used for the comparison.
    pub tolerance: f32,
    /// Largest absolute difference found.
    pub max_abs_diff: f32,
    /// Mean absolute difference over all elements.
    pub mean_abs_diff: f32,
    /// Number of elements whose difference exceeds the tolerance.
    pub num_mismatches: usize,
    /// The first mismatching element in row-major order.
    pub first_mismatch: Option<Mismatch>,
}

impl ComparisonReport {
    /// Whether every element is within the tolerance.
    pub fn passed(&self) -> bool {
        self.num_mismatches == 0
    }
}

impl std::fmt::Display for ComparisonReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} mismatches above {:e} (max diff {:e}, mean diff {:e})",
            self.num_mismatches, self.tolerance, self.max_abs_diff, self.mean_abs_diff
        )?;
        if let Some(m) = self.first_mismatch {
            write!(
                f,
                ", first at ({}, {}): expected {} got {}",
                m.row, m.col, m.expected, m.actual
            )?;
        }
        Ok(())
    }
}

/// Compare two outputs elementwise with an absolute tolerance.
///
/// A `NaN` on either side counts as a mismatch.
///
/// # Arguments
///
/// * `expected` - The reference output.
/// * `actual` - The output under test.
/// * `tolerance` - Largest accepted absolute difference.
///
/// # Errors
///
/// Fails if the images differ in size or the tolerance is negative or not finite.
///
/// # Example
///
/// ```
/// use tessel_image::Image;
/// use tessel_conv::compare::compare;
///
/// let a = Image::new([2, 1].into(), vec![1.0, 2.0]).unwrap();
/// let b = Image::new([2, 1].into(), vec![1.0, 2.5]).unwrap();
///
/// let report = compare(&a, &b, 1e-6).unwrap();
/// assert!(!report.passed());
/// assert_eq!(report.num_mismatches, 1);
/// ```
pub fn compare(
    expected: &Image<f32>,
    actual: &Image<f32>,
    tolerance: f32,
) -> Result<ComparisonReport, ConvolutionError> {
    if expected.size() != actual.size() {
        return Err(ConvolutionError::ImageSizeMismatch(
            expected.rows(),
            expected.cols(),
            actual.rows(),
            actual.cols(),
        ));
    }
    if !tolerance.is_finite() || tolerance < 0.0 {
        return Err(ConvolutionError::InvalidTolerance(tolerance));
    }

    let cols = expected.cols();
    let mut report = ComparisonReport {
        tolerance,
        max_abs_diff: 0.0,
        mean_abs_diff: 0.0,
        num_mismatches: 0,
        first_mismatch: None,
    };

    let mut total = 0.0f64;
    for (i, (&e, &a)) in expected
        .as_slice()
        .iter()
        .zip(actual.as_slice().iter())
        .enumerate()
    {
        let diff = (e - a).abs();
        total += diff as f64;
        report.max_abs_diff = report.max_abs_diff.max(diff);

        if diff.is_nan() || diff > tolerance {
            report.num_mismatches += 1;
            if report.first_mismatch.is_none() {
                report.first_mismatch = Some(Mismatch {
                    row: i / cols,
                    col: i % cols,
                    expected: e,
                    actual: a,
                });
            }
        }
    }

    if expected.numel() > 0 {
        report.mean_abs_diff = (total / expected.numel() as f64) as f32;
    }

    Ok(report)
}

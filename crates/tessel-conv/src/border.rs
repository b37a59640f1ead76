/// Border handling modes for out-of-range image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderMode {
    /// Replicate the value of the nearest border pixel.
    /// Corresponds to OpenCV's `BORDER_REPLICATE`.
    #[default]
    Replicate,
}

impl BorderMode {
    /// Map a possibly out-of-range index onto `[0, len)`.
    ///
    /// PRECONDITION: `len > 0`.
    #[inline]
    pub fn map_index(&self, idx: isize, len: usize) -> usize {
        match self {
            BorderMode::Replicate => clamp_index(idx, len),
        }
    }
}

/// Clamp a coordinate to the nearest valid index on an axis of length `len`.
///
/// Computes `min(max(idx, 0), len - 1)`.
///
/// PRECONDITION: `len > 0`.
///
/// # Example
///
/// ```
/// use tessel_conv::border::clamp_index;
///
/// assert_eq!(clamp_index(-3, 5), 0);
/// assert_eq!(clamp_index(2, 5), 2);
/// assert_eq!(clamp_index(9, 5), 4);
/// ```
#[inline]
pub fn clamp_index(idx: isize, len: usize) -> usize {
    debug_assert!(len > 0, "cannot clamp onto an empty axis");
    idx.clamp(0, len as isize - 1) as usize
}

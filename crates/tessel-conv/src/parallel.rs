use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    /// The row stride must be valid.
    #[error("row stride must be > 0 and divide the buffer length, got {0}")]
    InvalidRowStride(usize),
}

/// Controls how host-side row loops are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to process rows in parallel.
    #[default]
    ParallelRows,

    /// Run sequentially on the current thread.
    ///
    /// Useful for small images, debugging, or when the overhead of parallelization
    /// outweighs the benefits.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

/// Apply `op` to every row of `dst` following the given strategy.
///
/// `op` receives the row index and the mutable row slice of length `stride`.
/// Rows are independent; no order between them is guaranteed.
///
/// # Errors
///
/// Fails if `stride` is zero or does not divide `dst.len()`, or if a
/// [`ExecutionStrategy::Fixed`] pool cannot be built.
pub fn for_each_row<T, F>(
    strategy: ExecutionStrategy,
    dst: &mut [T],
    stride: usize,
    op: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if stride == 0 || dst.len() % stride != 0 {
        return Err(ParallelError::InvalidRowStride(stride));
    }

    match strategy {
        ExecutionStrategy::Serial => {
            dst.chunks_exact_mut(stride)
                .enumerate()
                .for_each(|(r, row)| op(r, row));
        }
        ExecutionStrategy::ParallelRows => {
            dst.par_chunks_exact_mut(stride)
                .enumerate()
                .for_each(|(r, row)| op(r, row));
        }
        ExecutionStrategy::Fixed(n) => {
            if n == 0 {
                return Err(ParallelError::InvalidThreadCount(n));
            }
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| ParallelError::BuildError(e.to_string()))?;

            pool.install(|| {
                dst.par_chunks_exact_mut(stride)
                    .enumerate()
                    .for_each(|(r, row)| op(r, row));
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_row_index(strategy: ExecutionStrategy) -> Result<Vec<usize>, ParallelError> {
        let mut dst = vec![0usize; 6];
        for_each_row(strategy, &mut dst, 2, |r, row| {
            row.iter_mut().enumerate().for_each(|(c, v)| *v = r * 10 + c)
        })?;
        Ok(dst)
    }

    #[test]
    fn test_for_each_row_strategies() -> Result<(), ParallelError> {
        let expected = vec![0, 1, 10, 11, 20, 21];
        assert_eq!(fill_row_index(ExecutionStrategy::Serial)?, expected);
        assert_eq!(fill_row_index(ExecutionStrategy::ParallelRows)?, expected);
        assert_eq!(fill_row_index(ExecutionStrategy::Fixed(2))?, expected);
        Ok(())
    }

    #[test]
    fn test_for_each_row_invalid_stride() {
        let mut dst = vec![0; 5];
        let res = for_each_row(ExecutionStrategy::Serial, &mut dst, 0, |_, _| {});
        assert_eq!(res, Err(ParallelError::InvalidRowStride(0)));
        let res = for_each_row(ExecutionStrategy::Serial, &mut dst, 2, |_, _| {});
        assert_eq!(res, Err(ParallelError::InvalidRowStride(2)));
    }

    #[test]
    fn test_for_each_row_fixed_error() {
        let mut dst = vec![0; 4];
        let res = for_each_row(ExecutionStrategy::Fixed(0), &mut dst, 2, |_, _| {});
        assert_eq!(res, Err(ParallelError::InvalidThreadCount(0)));
    }
}

//! Compile-time constants for the convolution kernels.
//!
//! The tile edge and the maximum filter size size the per-group staging
//! buffers, so they stay constants rather than runtime parameters.

/// Edge length of a square tile. A work group has `TILE_SIZE * TILE_SIZE` work items.
pub const TILE_SIZE: usize = 16;

/// Edge length of the staging buffer: the tile plus its eight neighbouring tiles.
pub const STAGING_SIZE: usize = 3 * TILE_SIZE;

/// Largest supported filter side length. Odd and strictly smaller than [`TILE_SIZE`].
pub const MAX_FILTER_SIZE: usize = TILE_SIZE - 1;

/// Gaussian sigma used when the caller does not pick one.
pub const DEFAULT_SIGMA: f32 = 1.5;

/// Absolute tolerance used to compare the naive and tiled outputs.
pub const DEFAULT_TOLERANCE: f32 = 1e-6;

/// Bytes of fast memory one work group uses: the staging buffer plus the shared filter.
pub const SHARED_MEMORY_BYTES: usize =
    (STAGING_SIZE * STAGING_SIZE + MAX_FILTER_SIZE * MAX_FILTER_SIZE) * std::mem::size_of::<f32>();

const _: () = assert!(MAX_FILTER_SIZE % 2 == 1 && MAX_FILTER_SIZE < TILE_SIZE);

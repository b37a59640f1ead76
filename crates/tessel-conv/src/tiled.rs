//! Tiled convolution.
//!
//! The image is split into `TILE_SIZE x TILE_SIZE` tiles. Each tile is handled
//! by one cooperative work group with one work item per output pixel. A group
//! runs in two phases:
//!
//! 1. staging: every work item copies its share of the filter into the shared
//!    filter buffer, and one pixel of each of the nine tiles centered on its own
//!    tile into the `3T x 3T` staging buffer, clamping every source coordinate;
//! 2. convolution: every work item reads only the staging buffer and writes
//!    exactly one output pixel.
//!
//! The barrier between the two phases is [`TileGroup::barrier`]: it freezes the
//! group into a [`StagedTile`], the only type that can read the staging buffer.
//! Tiles share nothing, so the grid runs them in any order.

use rayon::prelude::*;
use tessel_image::Image;

use crate::border::BorderMode;
use crate::config::{MAX_FILTER_SIZE, STAGING_SIZE, TILE_SIZE};
use crate::error::ConvolutionError;
use crate::filter::Filter;
use crate::naive::validate_shapes;

/// Position of a tile in the launch grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCoord {
    /// Tile row, the grid `y` coordinate.
    pub row: usize,
    /// Tile column, the grid `x` coordinate.
    pub col: usize,
}

impl TileCoord {
    /// Global `(row, col)` of the top-left pixel of the tile.
    #[inline]
    pub fn origin(&self) -> (usize, usize) {
        (self.row * TILE_SIZE, self.col * TILE_SIZE)
    }
}

/// One work item of a group, addressed by its position inside the tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    /// Row inside the tile.
    pub local_row: usize,
    /// Column inside the tile.
    pub local_col: usize,
}

impl WorkItem {
    /// Row-major index of the work item inside the group.
    #[inline]
    pub fn linear(&self) -> usize {
        self.local_row * TILE_SIZE + self.local_col
    }
}

/// All the work items of one group, row-major.
pub fn work_items() -> impl Iterator<Item = WorkItem> {
    (0..TILE_SIZE).flat_map(|local_row| {
        (0..TILE_SIZE).map(move |local_col| WorkItem {
            local_row,
            local_col,
        })
    })
}

/// Number of tiles along each axis, `(grid_rows, grid_cols)`.
#[inline]
pub fn grid_dims(rows: usize, cols: usize) -> (usize, usize) {
    (rows.div_ceil(TILE_SIZE), cols.div_ceil(TILE_SIZE))
}

/// Fast memory of one work group during the staging phase.
pub struct TileGroup {
    tile: TileCoord,
    filter_size: usize,
    staging: [[f32; STAGING_SIZE]; STAGING_SIZE],
    shared_filter: [f32; MAX_FILTER_SIZE * MAX_FILTER_SIZE],
    arrived: usize,
}

impl TileGroup {
    /// Allocate the fast memory of the group working on `tile`.
    ///
    /// PRECONDITION: `filter_size` is odd and smaller than [`TILE_SIZE`].
    pub fn new(tile: TileCoord, filter_size: usize) -> Self {
        debug_assert!(filter_size % 2 == 1 && filter_size <= MAX_FILTER_SIZE);
        Self {
            tile,
            filter_size,
            staging: [[0.0; STAGING_SIZE]; STAGING_SIZE],
            shared_filter: [0.0; MAX_FILTER_SIZE * MAX_FILTER_SIZE],
            arrived: 0,
        }
    }

    /// Run the staging phase of one work item.
    ///
    /// Work items whose linear index is below `filter_size²` also copy one
    /// filter weight. Every work item copies nine pixels: the pixel at its own
    /// local position in each of the 3x3 tiles centered on this tile.
    pub fn stage(&mut self, item: WorkItem, src: &[f32], rows: usize, cols: usize, filter: &[f32]) {
        let linear = item.linear();
        if linear < self.filter_size * self.filter_size {
            self.shared_filter[linear] = filter[linear];
        }

        let border = BorderMode::Replicate;
        let (row0, col0) = self.tile.origin();
        let tile = TILE_SIZE as isize;

        for block_row in 0..3 {
            let global_row = row0 as isize + (block_row as isize - 1) * tile + item.local_row as isize;
            let src_row = border.map_index(global_row, rows) * cols;
            let staging_row = &mut self.staging[block_row * TILE_SIZE + item.local_row];

            for block_col in 0..3 {
                let global_col =
                    col0 as isize + (block_col as isize - 1) * tile + item.local_col as isize;
                staging_row[block_col * TILE_SIZE + item.local_col] =
                    src[src_row + border.map_index(global_col, cols)];
            }
        }

        self.arrived += 1;
    }

    /// Wait for every work item to finish staging.
    ///
    /// Borrowing the group for the lifetime of the returned [`StagedTile`]
    /// forbids any further staging write while the buffer is being read.
    pub fn barrier(&mut self) -> StagedTile<'_> {
        debug_assert_eq!(
            self.arrived,
            TILE_SIZE * TILE_SIZE,
            "barrier reached before every work item staged"
        );
        StagedTile { group: self }
    }
}

/// Read-only view of a fully staged group, the convolution phase.
pub struct StagedTile<'a> {
    group: &'a TileGroup,
}

impl StagedTile<'_> {
    #[cfg(test)]
    fn tile(&self) -> TileCoord {
        self.group.tile
    }

    /// Staged value at offset `(dr, dc)` from the work item's own pixel.
    #[cfg(test)]
    fn neighbour(&self, item: WorkItem, dr: isize, dc: isize) -> f32 {
        let r = (item.local_row + TILE_SIZE) as isize + dr;
        let c = (item.local_col + TILE_SIZE) as isize + dc;
        self.group.staging[r as usize][c as usize]
    }

    /// Compute the output pixel of one work item from the staging buffer only.
    ///
    /// Offsets are visited row-major, outer `dr` and inner `dc`.
    #[inline]
    pub fn convolve(&self, item: WorkItem) -> f32 {
        let group = self.group;
        let k = (group.filter_size / 2) as isize;
        let center_col = item.local_col + TILE_SIZE;

        let mut sum = 0.0f32;
        let mut w = 0;
        for dr in -k..=k {
            let staging_row = &group.staging[((item.local_row + TILE_SIZE) as isize + dr) as usize];
            for dc in -k..=k {
                sum += staging_row[(center_col as isize + dc) as usize] * group.shared_filter[w];
                w += 1;
            }
        }
        sum
    }
}

/// The output pixels computed by one group.
pub struct TileOutput {
    tile: TileCoord,
    values: [f32; TILE_SIZE * TILE_SIZE],
}

impl TileOutput {
    /// The tile the values belong to.
    pub fn tile(&self) -> TileCoord {
        self.tile
    }

    /// Value computed by the work item at `(local_row, local_col)`.
    #[cfg(test)]
    fn get(&self, local_row: usize, local_col: usize) -> f32 {
        self.values[local_row * TILE_SIZE + local_col]
    }

    /// Copy the in-bounds values into a band of `TILE_SIZE` image rows.
    ///
    /// `band` starts at the first row of the tile row and may be shorter than
    /// `TILE_SIZE` rows for the last band of the image.
    fn write_into(&self, band: &mut [f32], cols: usize) {
        let (_, col0) = self.tile.origin();
        let width = TILE_SIZE.min(cols - col0);
        band.chunks_exact_mut(cols)
            .enumerate()
            .for_each(|(local_row, row)| {
                let src = &self.values[local_row * TILE_SIZE..local_row * TILE_SIZE + width];
                row[col0..col0 + width].copy_from_slice(src);
            });
    }
}

/// Process a single tile: stage, synchronize, convolve.
///
/// Work items outside the image still take part in staging but their output is
/// never written back.
///
/// PRECONDITION: `rows * cols == src.len()`, both positive, and the filter
/// passed [`crate::filter::validate_filter_size`].
pub fn convolve_tile(
    src: &[f32],
    rows: usize,
    cols: usize,
    filter: &Filter,
    tile: TileCoord,
) -> TileOutput {
    let mut group = TileGroup::new(tile, filter.size());

    // phase 1: cooperative staging
    for item in work_items() {
        group.stage(item, src, rows, cols, filter.as_slice());
    }

    let staged = group.barrier();

    // phase 2: every work item reads the staging buffer only
    let (row0, col0) = tile.origin();
    let mut values = [0.0f32; TILE_SIZE * TILE_SIZE];
    for item in work_items() {
        if row0 + item.local_row < rows && col0 + item.local_col < cols {
            values[item.linear()] = staged.convolve(item);
        }
    }

    TileOutput { tile, values }
}

/// Run every tile of the grid on the current rayon pool and write the output.
///
/// Each band of `TILE_SIZE` rows is owned by one task, tiles inside the band are
/// independent tasks. No tile depends on another one's execution.
pub(crate) fn run_grid(src: &[f32], dst: &mut [f32], rows: usize, cols: usize, filter: &Filter) {
    let (_, grid_cols) = grid_dims(rows, cols);

    dst.par_chunks_mut(TILE_SIZE * cols)
        .enumerate()
        .for_each(|(tile_row, band)| {
            let outputs = (0..grid_cols)
                .into_par_iter()
                .map(|tile_col| {
                    let tile = TileCoord {
                        row: tile_row,
                        col: tile_col,
                    };
                    convolve_tile(src, rows, cols, filter, tile)
                })
                .collect::<Vec<_>>();

            outputs.iter().for_each(|out| out.write_into(band, cols));
        });
}

/// Convolve an image with the tiled algorithm on the global rayon pool.
///
/// Produces the same weighted sums as [`crate::naive::naive_convolution`],
/// border pixels replicate the nearest edge.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W).
/// * `dst` - The destination image with shape (H, W).
/// * `filter` - The square filter, strictly smaller than the tile edge.
///
/// # Errors
///
/// Fails on empty images, mismatched shapes or an invalid filter size.
///
/// # Example
///
/// ```
/// use tessel_image::Image;
/// use tessel_conv::{filter::gaussian_kernel_2d, tiled::tiled_convolution};
///
/// let src = Image::from_size_val([4, 4].into(), 1.0).unwrap();
/// let mut dst = Image::from_size_val(src.size(), 0.0).unwrap();
/// let filter = gaussian_kernel_2d(3, 1.5).unwrap();
///
/// tiled_convolution(&src, &mut dst, &filter).unwrap();
/// assert!(dst.as_slice().iter().all(|v| (v - 1.0).abs() < 1e-6));
/// ```
pub fn tiled_convolution(
    src: &Image<f32>,
    dst: &mut Image<f32>,
    filter: &Filter,
) -> Result<(), ConvolutionError> {
    validate_shapes(src, dst, filter)?;

    let (rows, cols) = (src.rows(), src.cols());
    run_grid(src.as_slice(), dst.as_slice_mut(), rows, cols, filter);

    Ok(())
}

//! Tiled iteration over large rasters

use distmap_core::io::BlockReader;
use distmap_core::{RasterElement, Region};

/// Iterator over rectangular regions covering a raster.
///
/// Regions are disjoint, visited row-major, and clipped at the right and
/// bottom edges. The iterator is lazy and cheap to clone; [`reset`]
/// restarts it from the first region.
///
/// [`reset`]: TileIterator::reset
#[derive(Debug, Clone)]
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    tile_rows: usize,
    tile_cols: usize,
    current_row: usize,
    current_col: usize,
}

impl TileIterator {
    /// Square tiles of `tile_size` cells per side
    pub fn new(total_rows: usize, total_cols: usize, tile_size: usize) -> Self {
        Self::rectangular(total_rows, total_cols, tile_size, tile_size)
    }

    /// Tiles of `tile_rows x tile_cols`
    pub fn rectangular(total_rows: usize, total_cols: usize, tile_rows: usize, tile_cols: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            tile_rows: tile_rows.max(1),
            tile_cols: tile_cols.max(1),
            current_row: 0,
            current_col: 0,
        }
    }

    /// Native storage blocks of a reader
    pub fn native_blocks<T: RasterElement, R: BlockReader<T> + ?Sized>(reader: &R) -> Self {
        let (rows, cols) = reader.meta().shape();
        let (block_rows, block_cols) = reader.block_shape();
        Self::rectangular(rows, cols, block_rows, block_cols)
    }

    /// Total number of regions in a full pass
    pub fn tile_count(&self) -> usize {
        if self.total_rows == 0 || self.total_cols == 0 {
            return 0;
        }
        self.total_rows.div_ceil(self.tile_rows) * self.total_cols.div_ceil(self.tile_cols)
    }

    /// Restart from the first region
    pub fn reset(&mut self) {
        self.current_row = 0;
        self.current_col = 0;
    }

    /// Pair every tile with its padded read region
    pub fn padded(self, margin: usize) -> PaddedTiles {
        PaddedTiles { tiles: self, margin }
    }

    fn remaining(&self) -> usize {
        if self.total_cols == 0 || self.current_row >= self.total_rows {
            return 0;
        }
        let per_row = self.total_cols.div_ceil(self.tile_cols);
        let done_in_row = self.current_col / self.tile_cols;
        let rows_left = (self.total_rows - self.current_row).div_ceil(self.tile_rows);
        rows_left * per_row - done_in_row
    }
}

impl Iterator for TileIterator {
    type Item = Region;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let rows = self.tile_rows.min(self.total_rows - self.current_row);
        let cols = self.tile_cols.min(self.total_cols - self.current_col);
        let region = Region::new(self.current_row, self.current_col, rows, cols);

        self.current_col += self.tile_cols;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.tile_rows;
        }

        Some(region)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for TileIterator {}

/// Expand `tile` by `margin` cells on every side, clipped to the raster.
///
/// A distance transform over the returned region reproduces the whole-grid
/// result for every cell of `tile` whose nearest feature lies inside the
/// region. When the nearest feature is farther away than the margin
/// reaches, the tile-local value is an over-estimate (or infinite when no
/// feature is visible at all). Choosing a margin at least as large as the
/// longest distance that must be exact is the caller's responsibility.
pub fn pad(tile: &Region, margin: usize, total_rows: usize, total_cols: usize) -> Region {
    let row_off = tile.row_off.saturating_sub(margin);
    let col_off = tile.col_off.saturating_sub(margin);
    let row_end = tile.row_end().saturating_add(margin).min(total_rows);
    let col_end = tile.col_end().saturating_add(margin).min(total_cols);
    Region::new(row_off, col_off, row_end - row_off, col_end - col_off)
}

/// A tile and the padded region read to compute it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddedTile {
    /// Region written to the output
    pub tile: Region,
    /// Region read from the source, containing `tile`
    pub read: Region,
}

impl PaddedTile {
    pub fn new(tile: Region, margin: usize, total_rows: usize, total_cols: usize) -> Self {
        Self {
            tile,
            read: pad(&tile, margin, total_rows, total_cols),
        }
    }

    /// Offset of the tile's top-left cell inside the read region
    pub fn crop_offsets(&self) -> (usize, usize) {
        (
            self.tile.row_off - self.read.row_off,
            self.tile.col_off - self.read.col_off,
        )
    }

    /// The tile expressed in read-region coordinates
    pub fn crop_region(&self) -> Region {
        self.read.relative(&self.tile)
    }
}

/// Iterator of [`PaddedTile`]s, see [`TileIterator::padded`]
#[derive(Debug, Clone)]
pub struct PaddedTiles {
    tiles: TileIterator,
    margin: usize,
}

impl Iterator for PaddedTiles {
    type Item = PaddedTile;

    fn next(&mut self) -> Option<Self::Item> {
        let tile = self.tiles.next()?;
        Some(PaddedTile::new(
            tile,
            self.margin,
            self.tiles.total_rows,
            self.tiles.total_cols,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.tiles.size_hint()
    }
}

impl ExactSizeIterator for PaddedTiles {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_iterator() {
        let tiles: Vec<_> = TileIterator::new(100, 100, 32).collect();
        assert_eq!(tiles.len(), 16);

        // First tile should start at (0, 0), last one is clipped
        assert_eq!(tiles[0], Region::new(0, 0, 32, 32));
        assert_eq!(tiles[15], Region::new(96, 96, 4, 4));
        // Row-major order
        assert_eq!(tiles[1], Region::new(0, 32, 32, 32));
        assert_eq!(tiles[4], Region::new(32, 0, 32, 32));
    }

    #[test]
    fn test_tile_coverage() {
        let rows = 37;
        let cols = 53;
        let mut covered = vec![vec![0u8; cols]; rows];

        for tile in TileIterator::rectangular(rows, cols, 8, 16) {
            assert!(tile.is_within(rows, cols));
            for r in tile.row_off..tile.row_end() {
                for c in tile.col_off..tile.col_end() {
                    covered[r][c] += 1;
                }
            }
        }

        // Every cell covered exactly once
        for r in 0..rows {
            for c in 0..cols {
                assert_eq!(covered[r][c], 1, "Cell ({}, {}) covered {} times", r, c, covered[r][c]);
            }
        }
    }

    #[test]
    fn test_exact_size_and_reset() {
        let mut it = TileIterator::rectangular(10, 7, 3, 4);
        assert_eq!(it.len(), 8);
        assert_eq!(it.tile_count(), 8);
        it.next();
        it.next();
        it.next();
        assert_eq!(it.len(), 5);
        let rest: Vec<_> = it.clone().collect();
        assert_eq!(rest.len(), 5);
        it.reset();
        assert_eq!(it.next(), Some(Region::new(0, 0, 3, 4)));
    }

    #[test]
    fn test_empty_raster_yields_nothing() {
        assert_eq!(TileIterator::new(0, 10, 4).count(), 0);
        assert_eq!(TileIterator::new(10, 0, 4).count(), 0);
        assert_eq!(TileIterator::new(0, 10, 4).tile_count(), 0);
    }

    #[test]
    fn test_pad_interior_and_edges() {
        let interior = pad(&Region::new(10, 10, 5, 5), 3, 100, 100);
        assert_eq!(interior, Region::new(7, 7, 11, 11));

        let corner = PaddedTile::new(Region::new(0, 0, 5, 5), 3, 6, 100);
        assert_eq!(corner.read, Region::new(0, 0, 6, 8));
        assert_eq!(corner.crop_offsets(), (0, 0));

        let far = PaddedTile::new(Region::new(95, 40, 5, 5), 8, 100, 100);
        assert_eq!(far.read, Region::new(87, 32, 13, 21));
        assert_eq!(far.crop_offsets(), (8, 8));
        assert_eq!(far.crop_region(), Region::new(8, 8, 5, 5));
        assert!(far.read.contains(&far.tile));
    }

    #[test]
    fn test_zero_margin_is_identity() {
        for t in TileIterator::new(20, 30, 7).padded(0) {
            assert_eq!(t.tile, t.read);
            assert_eq!(t.crop_offsets(), (0, 0));
        }
    }
}

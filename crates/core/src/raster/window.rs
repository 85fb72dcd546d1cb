//! Rectangular windows inside a raster grid

use crate::error::{Error, Result};
use ndarray::{s, ArrayView2, ArrayViewMut2};

/// A rectangle of cells: `rows x cols` starting at (`row_off`, `col_off`).
///
/// Regions are used both for native storage blocks and for processing
/// tiles; a valid region always lies inside its raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub row_off: usize,
    pub col_off: usize,
    pub rows: usize,
    pub cols: usize,
}

impl Region {
    pub fn new(row_off: usize, col_off: usize, rows: usize, cols: usize) -> Self {
        Self {
            row_off,
            col_off,
            rows,
            cols,
        }
    }

    /// Region covering a whole `rows x cols` raster
    pub fn full(rows: usize, cols: usize) -> Self {
        Self::new(0, 0, rows, cols)
    }

    /// One past the last row
    pub fn row_end(&self) -> usize {
        self.row_off + self.rows
    }

    /// One past the last column
    pub fn col_end(&self) -> usize {
        self.col_off + self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of cells
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Whether the region lies inside a `rows x cols` raster
    pub fn is_within(&self, rows: usize, cols: usize) -> bool {
        self.row_end() <= rows && self.col_end() <= cols
    }

    /// Whether `other` is fully contained in this region
    pub fn contains(&self, other: &Region) -> bool {
        other.row_off >= self.row_off
            && other.col_off >= self.col_off
            && other.row_end() <= self.row_end()
            && other.col_end() <= self.col_end()
    }

    /// Overlap of two regions, if any
    pub fn intersection(&self, other: &Region) -> Option<Region> {
        let row_off = self.row_off.max(other.row_off);
        let col_off = self.col_off.max(other.col_off);
        let row_end = self.row_end().min(other.row_end());
        let col_end = self.col_end().min(other.col_end());
        if row_off >= row_end || col_off >= col_end {
            return None;
        }
        Some(Region::new(row_off, col_off, row_end - row_off, col_end - col_off))
    }

    /// Express `inner` relative to this region's origin.
    ///
    /// `inner` must be contained in `self`.
    pub fn relative(&self, inner: &Region) -> Region {
        debug_assert!(self.contains(inner));
        Region::new(
            inner.row_off - self.row_off,
            inner.col_off - self.col_off,
            inner.rows,
            inner.cols,
        )
    }

    /// Error unless the region lies inside a `rows x cols` raster
    pub fn check_within(&self, rows: usize, cols: usize) -> Result<()> {
        if self.is_within(rows, cols) {
            Ok(())
        } else {
            Err(Error::WindowOutOfBounds {
                row_off: self.row_off,
                col_off: self.col_off,
                rows: self.rows,
                cols: self.cols,
                raster_rows: rows,
                raster_cols: cols,
            })
        }
    }

    /// View of this region inside a larger array
    pub fn slice<'a, T>(&self, data: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        data.slice_move(s![self.row_off..self.row_end(), self.col_off..self.col_end()])
    }

    /// Mutable view of this region inside a larger array
    pub fn slice_mut<'a, T>(&self, data: ArrayViewMut2<'a, T>) -> ArrayViewMut2<'a, T> {
        data.slice_move(s![self.row_off..self.row_end(), self.col_off..self.col_end()])
    }
}

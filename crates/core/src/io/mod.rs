//! Block-oriented raster I/O
//!
//! The distance engine never asks for a whole raster: it reads windows
//! through [`BlockReader`] and emits windows through [`BlockWriter`].
//! Implementations are provided for in-memory rasters and for GeoTIFF files.

mod memory;
mod native;

pub use memory::{MemoryReader, MemoryWriter};
pub use native::{GeoTiffReader, GeoTiffWriter, TiffSample};

use crate::crs::CRS;
use crate::error::Result;
use crate::raster::{GeoTransform, PixelSpacing, RasterElement, Region};
use ndarray::{Array2, ArrayView2};

/// Shape and georeferencing of a single-band raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterMeta<T> {
    pub rows: usize,
    pub cols: usize,
    pub transform: GeoTransform,
    pub crs: Option<CRS>,
    pub nodata: Option<T>,
}

impl<T: RasterElement> RasterMeta<T> {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Region covering the whole raster
    pub fn extent(&self) -> Region {
        Region::full(self.rows, self.cols)
    }

    pub fn pixel_spacing(&self) -> PixelSpacing {
        self.transform.pixel_spacing()
    }

    /// Same georeferencing with a different element type and no NoData
    pub fn retyped<U: RasterElement>(&self) -> RasterMeta<U> {
        RasterMeta {
            rows: self.rows,
            cols: self.cols,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }
}

/// Source of raster windows
pub trait BlockReader<T: RasterElement> {
    /// Raster shape, georeferencing and NoData
    fn meta(&self) -> &RasterMeta<T>;

    /// `(rows, cols)` of one native storage block.
    ///
    /// Blocks tile the raster row-major starting at (0, 0); the last row
    /// and column of blocks may be clipped by the raster edge.
    fn block_shape(&self) -> (usize, usize);

    /// Read any window lying inside the raster
    fn read_window(&mut self, region: &Region) -> Result<Array2<T>>;

    /// Announce that overlapping windows of up to `rows x cols` are about
    /// to be read in row-major order, so decoded storage can be kept
    /// around for the overlap.
    fn reserve_window(&mut self, _rows: usize, _cols: usize) {}
}

/// Sink for raster windows
pub trait BlockWriter<T> {
    /// `(rows, cols)` of the raster being written
    fn shape(&self) -> (usize, usize);

    /// Write one window; `data` must have the region's shape
    fn write_window(&mut self, region: &Region, data: ArrayView2<'_, T>) -> Result<()>;
}

impl<T: RasterElement, R: BlockReader<T> + ?Sized> BlockReader<T> for &mut R {
    fn meta(&self) -> &RasterMeta<T> {
        (**self).meta()
    }

    fn block_shape(&self) -> (usize, usize) {
        (**self).block_shape()
    }

    fn read_window(&mut self, region: &Region) -> Result<Array2<T>> {
        (**self).read_window(region)
    }

    fn reserve_window(&mut self, rows: usize, cols: usize) {
        (**self).reserve_window(rows, cols)
    }
}

impl<T, W: BlockWriter<T> + ?Sized> BlockWriter<T> for &mut W {
    fn shape(&self) -> (usize, usize) {
        (**self).shape()
    }

    fn write_window(&mut self, region: &Region, data: ArrayView2<'_, T>) -> Result<()> {
        (**self).write_window(region, data)
    }
}

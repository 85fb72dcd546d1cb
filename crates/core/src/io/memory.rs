//! Block I/O over in-memory rasters

use super::{BlockReader, BlockWriter, RasterMeta};
use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement, Region};
use ndarray::{Array2, ArrayView2};

/// Serves windows of an in-memory raster with a configurable block layout
#[derive(Debug, Clone)]
pub struct MemoryReader<T: RasterElement> {
    raster: Raster<T>,
    meta: RasterMeta<T>,
    block_shape: (usize, usize),
    windows_read: usize,
}

impl<T: RasterElement> MemoryReader<T> {
    /// Reader with one-row strips as native blocks
    pub fn new(raster: Raster<T>) -> Self {
        let meta = RasterMeta {
            rows: raster.rows(),
            cols: raster.cols(),
            transform: *raster.transform(),
            crs: raster.crs().cloned(),
            nodata: raster.nodata(),
        };
        let block_shape = (1, raster.cols().max(1));
        Self {
            raster,
            meta,
            block_shape,
            windows_read: 0,
        }
    }

    /// Override the native block layout
    pub fn with_block_shape(mut self, rows: usize, cols: usize) -> Self {
        self.block_shape = (rows.max(1), cols.max(1));
        self
    }

    /// Number of `read_window` calls served so far
    pub fn windows_read(&self) -> usize {
        self.windows_read
    }

    pub fn raster(&self) -> &Raster<T> {
        &self.raster
    }
}

impl<T: RasterElement> BlockReader<T> for MemoryReader<T> {
    fn meta(&self) -> &RasterMeta<T> {
        &self.meta
    }

    fn block_shape(&self) -> (usize, usize) {
        self.block_shape
    }

    fn read_window(&mut self, region: &Region) -> Result<Array2<T>> {
        self.windows_read += 1;
        Ok(self.raster.window(region)?.to_owned())
    }
}

/// Collects written windows into an in-memory raster
#[derive(Debug, Clone)]
pub struct MemoryWriter<T: RasterElement> {
    raster: Raster<T>,
    windows_written: usize,
}

impl<T: RasterElement> MemoryWriter<T> {
    /// Writer for a raster with the given georeferencing
    pub fn new<S: RasterElement>(meta: &RasterMeta<S>) -> Self {
        let mut raster = Raster::new(meta.rows, meta.cols);
        raster.set_transform(meta.transform);
        raster.set_crs(meta.crs.clone());
        Self {
            raster,
            windows_written: 0,
        }
    }

    /// Number of `write_window` calls received so far
    pub fn windows_written(&self) -> usize {
        self.windows_written
    }

    pub fn into_raster(self) -> Raster<T> {
        self.raster
    }
}

impl<T: RasterElement> BlockWriter<T> for MemoryWriter<T> {
    fn shape(&self) -> (usize, usize) {
        self.raster.shape()
    }

    fn write_window(&mut self, region: &Region, data: ArrayView2<'_, T>) -> Result<()> {
        let (ar, ac) = data.dim();
        if (ar, ac) != region.shape() {
            return Err(Error::SizeMismatch {
                er: region.rows,
                ec: region.cols,
                ar,
                ac,
            });
        }
        self.raster.window_mut(region)?.assign(&data);
        self.windows_written += 1;
        Ok(())
    }
}

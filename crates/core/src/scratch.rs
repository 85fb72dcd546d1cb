//! Disk-backed scratch grids for out-of-core processing
//!
//! A [`ScratchSpace`] owns a private temporary directory; every
//! [`ScratchGrid`] allocated from it is a flat row-major file sized as if
//! the grid were held in memory. Only the windows a caller reads or writes
//! are ever resident. Dropping the space removes the directory, so scratch
//! storage is reclaimed on both success and error paths.

use crate::error::{Error, Result};
use crate::raster::Region;
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{Array2, ArrayView2};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Element types that can be stored in a scratch grid
pub trait ScratchElement: Copy + Default + Send + Sync + 'static {
    /// Encoded size in bytes
    const SIZE: usize;

    /// Decode `out.len()` values from `bytes`
    fn decode(bytes: &[u8], out: &mut [Self]);

    /// Encode `values` into `bytes`
    fn encode(values: &[Self], bytes: &mut [u8]);
}

impl ScratchElement for u8 {
    const SIZE: usize = 1;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        out.copy_from_slice(bytes);
    }

    fn encode(values: &[Self], bytes: &mut [u8]) {
        bytes.copy_from_slice(values);
    }
}

impl ScratchElement for bool {
    const SIZE: usize = 1;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        for (o, &b) in out.iter_mut().zip(bytes) {
            *o = b != 0;
        }
    }

    fn encode(values: &[Self], bytes: &mut [u8]) {
        for (b, &v) in bytes.iter_mut().zip(values) {
            *b = v as u8;
        }
    }
}

impl ScratchElement for f32 {
    const SIZE: usize = 4;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        LittleEndian::read_f32_into(bytes, out);
    }

    fn encode(values: &[Self], bytes: &mut [u8]) {
        LittleEndian::write_f32_into(values, bytes);
    }
}

impl ScratchElement for f64 {
    const SIZE: usize = 8;

    fn decode(bytes: &[u8], out: &mut [Self]) {
        LittleEndian::read_f64_into(bytes, out);
    }

    fn encode(values: &[Self], bytes: &mut [u8]) {
        LittleEndian::write_f64_into(values, bytes);
    }
}

/// Private temporary directory holding the scratch grids of one run
#[derive(Debug)]
pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// Create a scratch directory under `parent`, or the system temp dir
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("distmap-");
        let dir = match parent {
            Some(p) => builder.tempdir_in(p)?,
            None => builder.tempdir()?,
        };
        debug!("scratch space at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Allocate a zero-initialized `rows x cols` grid backed by a file named `name`
    pub fn allocate<T: ScratchElement>(
        &self,
        name: &str,
        rows: usize,
        cols: usize,
    ) -> Result<ScratchGrid<T>> {
        if rows == 0 || cols == 0 {
            return Err(Error::EmptyRaster { rows, cols });
        }
        let bytes = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(T::SIZE))
            .ok_or(Error::InvalidDimensions {
                width: cols,
                height: rows,
            })?;

        let path = self.dir.path().join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        // Sparse on most filesystems; reads of unwritten cells return zero bytes.
        file.set_len(bytes as u64)?;
        debug!("allocated scratch grid {} ({}x{}, {} bytes)", name, rows, cols, bytes);

        Ok(ScratchGrid {
            file,
            path,
            rows,
            cols,
            buf: Vec::new(),
            _marker: PhantomData,
        })
    }

    /// Remove the directory now, surfacing any error instead of ignoring it on drop
    pub fn close(self) -> Result<()> {
        self.dir.close()?;
        Ok(())
    }
}

/// A row-major grid stored in a scratch file
#[derive(Debug)]
pub struct ScratchGrid<T: ScratchElement> {
    file: File,
    path: PathBuf,
    rows: usize,
    cols: usize,
    buf: Vec<u8>,
    _marker: PhantomData<T>,
}

impl<T: ScratchElement> ScratchGrid<T> {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a window into memory.
    ///
    /// Full-width and single-row windows are one contiguous span of the
    /// file and take a single read; other windows take one read per row.
    pub fn read_window(&mut self, region: &Region) -> Result<Array2<T>> {
        region.check_within(self.rows, self.cols)?;
        let mut out = Array2::from_elem(region.shape(), T::default());
        if region.is_empty() {
            return Ok(out);
        }

        if self.is_contiguous(region) {
            self.buf.resize(region.len() * T::SIZE, 0);
            self.seek_to(region.row_off, region.col_off)?;
            self.file.read_exact(&mut self.buf)?;
            let dst = out
                .as_slice_mut()
                .ok_or_else(|| Error::Other("scratch window buffer is not contiguous".into()))?;
            T::decode(&self.buf, dst);
            return Ok(out);
        }

        self.buf.resize(region.cols * T::SIZE, 0);
        for (r, mut row) in out.rows_mut().into_iter().enumerate() {
            self.seek_to(region.row_off + r, region.col_off)?;
            self.file.read_exact(&mut self.buf)?;
            let dst = row
                .as_slice_mut()
                .ok_or_else(|| Error::Other("scratch row buffer is not contiguous".into()))?;
            T::decode(&self.buf, dst);
        }
        Ok(out)
    }

    /// Write a window; `data` must have the region's shape
    pub fn write_window(&mut self, region: &Region, data: ArrayView2<'_, T>) -> Result<()> {
        region.check_within(self.rows, self.cols)?;
        let (ar, ac) = data.dim();
        if (ar, ac) != region.shape() {
            return Err(Error::SizeMismatch {
                er: region.rows,
                ec: region.cols,
                ar,
                ac,
            });
        }
        if region.is_empty() {
            return Ok(());
        }

        if self.is_contiguous(region) {
            // Logical row-major order, whatever the memory layout of `data`
            let values: Vec<T> = data.iter().copied().collect();
            self.buf.resize(values.len() * T::SIZE, 0);
            T::encode(&values, &mut self.buf);
            self.seek_to(region.row_off, region.col_off)?;
            self.file.write_all(&self.buf)?;
            return Ok(());
        }

        self.buf.resize(region.cols * T::SIZE, 0);
        let mut values = vec![T::default(); region.cols];
        for (r, row) in data.rows().into_iter().enumerate() {
            for (v, &x) in values.iter_mut().zip(row.iter()) {
                *v = x;
            }
            T::encode(&values, &mut self.buf);
            self.seek_to(region.row_off + r, region.col_off)?;
            self.file.write_all(&self.buf)?;
        }
        Ok(())
    }

    fn is_contiguous(&self, region: &Region) -> bool {
        region.cols == self.cols || region.rows == 1
    }

    /// Flush buffered writes to the backing file
    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn seek_to(&mut self, row: usize, col: usize) -> Result<()> {
        let offset = (row * self.cols + col) * T::SIZE;
        self.file.seek(SeekFrom::Start(offset as u64))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, ShapeBuilder};

    #[test]
    fn test_window_roundtrip_f64() {
        let space = ScratchSpace::new(None).unwrap();
        let mut grid = space.allocate::<f64>("distance.f64", 6, 7).unwrap();

        let block = array![[1.5, 2.5, 3.5], [4.5, f64::INFINITY, 6.5]];
        let region = Region::new(3, 4, 2, 3);
        grid.write_window(&region, block.view()).unwrap();

        assert_eq!(grid.read_window(&region).unwrap(), block);
        // Unwritten cells read back as zero
        let corner = grid.read_window(&Region::new(0, 0, 1, 2)).unwrap();
        assert_eq!(corner, array![[0.0, 0.0]]);
    }

    #[test]
    fn test_bool_grid_and_overlapping_reads() {
        let space = ScratchSpace::new(None).unwrap();
        let mut grid = space.allocate::<bool>("valid.bool", 4, 4).unwrap();
        grid.write_window(&Region::new(0, 0, 2, 4), array![[true, false, true, true], [false, false, true, false]].view())
            .unwrap();

        let col = grid.read_window(&Region::new(0, 2, 4, 1)).unwrap();
        assert_eq!(col, array![[true], [true], [false], [false]]);
    }

    #[test]
    fn test_rejects_bad_windows() {
        let space = ScratchSpace::new(None).unwrap();
        let mut grid = space.allocate::<u8>("binary.u8", 3, 3).unwrap();
        assert!(grid.read_window(&Region::new(2, 2, 2, 1)).is_err());
        assert!(grid
            .write_window(&Region::new(0, 0, 1, 2), array![[1u8, 2, 3]].view())
            .is_err());
        assert!(space.allocate::<u8>("empty.u8", 0, 3).is_err());
    }

    #[test]
    fn test_full_width_windows() {
        let space = ScratchSpace::new(None).unwrap();
        let mut grid = space.allocate::<f64>("rows.f64", 5, 4).unwrap();

        // Column-major source, written as one span
        let band = Array2::from_shape_vec((2, 4).f(), (0..8).map(f64::from).collect()).unwrap();
        grid.write_window(&Region::new(1, 0, 2, 4), band.view()).unwrap();
        grid.write_window(&Region::new(3, 1, 1, 2), array![[-1.0, -2.0]].view()).unwrap();

        assert_eq!(grid.read_window(&Region::new(1, 0, 2, 4)).unwrap(), band);
        assert_eq!(
            grid.read_window(&Region::new(2, 0, 2, 4)).unwrap(),
            array![[1.0, 3.0, 5.0, 7.0], [0.0, -1.0, -2.0, 0.0]]
        );
        // Partial-width window across the same rows
        assert_eq!(
            grid.read_window(&Region::new(1, 1, 3, 2)).unwrap(),
            array![[2.0, 4.0], [3.0, 5.0], [-1.0, -2.0]]
        );
    }

    #[test]
    fn test_space_is_removed() {
        let space = ScratchSpace::new(None).unwrap();
        let path = space.path().to_path_buf();
        {
            let _grid = space.allocate::<f32>("tmp.f32", 2, 2).unwrap();
        }
        assert!(path.exists());
        space.close().unwrap();
        assert!(!path.exists());
    }
}

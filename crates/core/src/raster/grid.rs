//! In-memory raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, PixelSpacing, RasterElement, Region};
use ndarray::{Array2, ArrayView2, ArrayViewMut2};

/// A georeferenced 2D raster grid held in memory.
///
/// `Raster<T>` backs the in-memory block reader and writer, and is what
/// small inputs and tests are built from. Large inputs never become a
/// `Raster`; they are streamed through [`crate::io::BlockReader`].
///
/// # Example
///
/// ```ignore
/// use distmap_core::Raster;
///
/// let mut raster: Raster<u8> = Raster::new(100, 100);
/// raster.set(10, 20, 1)?;
/// assert_eq!(raster.get(10, 20)?, 1);
/// ```
#[derive(Debug, Clone)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self::from_array(Array2::zeros((rows, cols)))
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self::from_array(array))
    }

    /// Create a raster from an ndarray
    pub fn from_array(data: Array2<T>) -> Self {
        Self {
            data,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or_else(|| self.out_of_bounds(Region::new(row, col, 1, 1)))
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        match self.data.get_mut((row, col)) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(self.out_of_bounds(Region::new(row, col, 1, 1))),
        }
    }

    /// View of a window of the raster
    pub fn window(&self, region: &Region) -> Result<ArrayView2<'_, T>> {
        let (rows, cols) = self.shape();
        region.check_within(rows, cols)?;
        Ok(region.slice(self.data.view()))
    }

    /// Mutable view of a window of the raster
    pub fn window_mut(&mut self, region: &Region) -> Result<ArrayViewMut2<'_, T>> {
        let (rows, cols) = self.shape();
        region.check_within(rows, cols)?;
        Ok(region.slice_mut(self.data.view_mut()))
    }

    /// Get a view of the underlying data
    pub fn view(&self) -> ArrayView2<'_, T> {
        self.data.view()
    }

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    /// Consume the raster and return the underlying array
    pub fn into_array(self) -> Array2<T> {
        self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Physical cell size along each axis
    pub fn pixel_spacing(&self) -> PixelSpacing {
        self.transform.pixel_spacing()
    }

    fn out_of_bounds(&self, region: Region) -> Error {
        Error::WindowOutOfBounds {
            row_off: region.row_off,
            col_off: region.col_off,
            rows: region.rows,
            cols: region.cols,
            raster_rows: self.rows(),
            raster_cols: self.cols(),
        }
    }
}

//! # distmap core
//!
//! Core types, scratch storage and block I/O for the distmap distance-map tools.
//!
//! This crate provides:
//! - `Raster<T>`: in-memory georeferenced grid
//! - `Region`: rectangular window inside a grid
//! - `GeoTransform` / `PixelSpacing`: affine georeferencing and cell size
//! - `CRS`: coordinate reference system identification
//! - `ScratchSpace` / `ScratchGrid`: disk-backed grids for out-of-core passes
//! - Block-oriented readers and writers (in memory and GeoTIFF)

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod scratch;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, PixelSpacing, Raster, RasterElement, Region};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{BlockReader, BlockWriter, RasterMeta};
    pub use crate::raster::{GeoTransform, PixelSpacing, Raster, RasterElement, Region};
    pub use crate::Algorithm;
}

/// Core trait for algorithms in distmap.
///
/// Algorithms are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

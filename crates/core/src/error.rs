//! Error types for distmap

use thiserror::Error;

/// Main error type for distmap operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Empty or degenerate raster: {rows}x{cols}")]
    EmptyRaster { rows: usize, cols: usize },

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Window ({row_off}, {col_off}) {rows}x{cols} outside raster of size ({raster_rows}, {raster_cols})")]
    WindowOutOfBounds {
        row_off: usize,
        col_off: usize,
        rows: usize,
        cols: usize,
        raster_rows: usize,
        raster_cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("TIFF error: {0}")]
    Tiff(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Other(String),
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => Error::Io(io),
            other => Error::Tiff(other.to_string()),
        }
    }
}

/// Result type alias for distmap operations
pub type Result<T> = std::result::Result<T, Error>;

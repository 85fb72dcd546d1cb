//! Affine geotransformation for rasters

use crate::error::{Error, Result};
use crate::raster::Region;
use serde::{Deserialize, Serialize};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are typically 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Convert pixel coordinates to geographic coordinates (top-left corner)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        let col_f = col as f64;
        let row_f = row as f64;

        let x = self.origin_x + col_f * self.pixel_width + row_f * self.row_rotation;
        let y = self.origin_y + col_f * self.col_rotation + row_f * self.pixel_height;

        (x, y)
    }

    /// Transform of a sub-window whose top-left pixel is `region`'s origin
    pub fn for_region(&self, region: &Region) -> Self {
        let (origin_x, origin_y) = self.pixel_to_geo_corner(region.col_off, region.row_off);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Physical cell size along columns (dx) and rows (dy).
    ///
    /// Rotation terms are ignored, matching how the distance transform
    /// samples the grid axis by axis.
    pub fn pixel_spacing(&self) -> PixelSpacing {
        PixelSpacing {
            dx: self.pixel_width.abs(),
            dy: self.pixel_height.abs(),
        }
    }

    /// Calculate the bounding box for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> (f64, f64, f64, f64) {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(width, 0);
        let (x2, y2) = self.pixel_to_geo_corner(0, height);
        let (x3, y3) = self.pixel_to_geo_corner(width, height);

        let min_x = x0.min(x1).min(x2).min(x3);
        let max_x = x0.max(x1).max(x2).max(x3);
        let min_y = y0.min(y1).min(y2).min(y3);
        let max_y = y0.max(y1).max(y2).max(y3);

        (min_x, min_y, max_x, max_y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Physical distance covered by one cell along each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSpacing {
    /// Spacing between columns
    pub dx: f64,
    /// Spacing between rows
    pub dy: f64,
}

impl PixelSpacing {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    /// Unit spacing: distances come out in pixels
    pub fn unit() -> Self {
        Self::new(1.0, 1.0)
    }

    /// Both spacings must be finite and strictly positive
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("pixel_spacing.dx", self.dx), ("pixel_spacing.dy", self.dy)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "pixel spacing must be finite and > 0".into(),
                });
            }
        }
        Ok(())
    }
}

impl Default for PixelSpacing {
    fn default() -> Self {
        Self::unit()
    }
}

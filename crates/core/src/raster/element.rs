//! Raster element trait for generic cell values

use num_traits::{NumCast, One, Zero};
use std::fmt::Debug;

/// Trait for types that can be stored in a raster cell.
///
/// Any single-band numeric encoding can feed the distance engine, so the
/// bound covers both integer and floating point samples.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + One + Send + Sync + 'static
{
    /// Fallback value used when a sample cannot be represented in this type
    fn default_nodata() -> Self;

    /// Whether this value is NaN (always false for integers)
    fn is_nan_value(self) -> bool;

    /// Exact sample equality where NaN matches NaN.
    ///
    /// NoData matching must not use a tolerance: a value of `1.0000001`
    /// is a distinct sample, not a feature and not NoData.
    fn same_as(self, other: Self) -> bool;

    /// Convert self to f64
    fn to_f64(self) -> Option<f64> {
        NumCast::from(self)
    }
}

macro_rules! impl_raster_element_int {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::MIN
            }

            fn is_nan_value(self) -> bool {
                false
            }

            fn same_as(self, other: Self) -> bool {
                self == other
            }
        }
    };
}

macro_rules! impl_raster_element_float {
    ($t:ty) => {
        impl RasterElement for $t {
            fn default_nodata() -> Self {
                <$t>::NAN
            }

            fn is_nan_value(self) -> bool {
                self.is_nan()
            }

            fn same_as(self, other: Self) -> bool {
                self == other || (self.is_nan() && other.is_nan())
            }
        }
    };
}

impl_raster_element_int!(i8);
impl_raster_element_int!(i16);
impl_raster_element_int!(i32);
impl_raster_element_int!(i64);
impl_raster_element_int!(u8);
impl_raster_element_int!(u16);
impl_raster_element_int!(u32);
impl_raster_element_int!(u64);
impl_raster_element_float!(f32);
impl_raster_element_float!(f64);

//! Binary mask builder
//!
//! Turns a raw source block into the two grids the transform needs: a
//! binary grid where `0` marks a feature (the transform measures distance
//! to zeros) and a validity grid where `false` marks NoData.

use distmap_core::RasterElement;
use ndarray::{Array2, ArrayView2, Zip};

/// Binary and validity grids derived from one source block
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedBlock {
    /// `0` = feature, `1` = background or invalid
    pub binary: Array2<u8>,
    /// `false` where the source cell is NoData
    pub validity: Array2<bool>,
}

impl MaskedBlock {
    pub fn shape(&self) -> (usize, usize) {
        self.binary.dim()
    }

    /// Number of feature cells
    pub fn feature_count(&self) -> u64 {
        self.binary.iter().filter(|&&b| b == 0).count() as u64
    }

    /// Number of valid cells
    pub fn valid_count(&self) -> u64 {
        self.validity.iter().filter(|&&v| v).count() as u64
    }
}

/// NoData value that actually takes part in classification.
///
/// A NoData equal to the feature (`1`) or background (`0`) code would make
/// real cells disappear, so it is ignored.
pub fn effective_nodata<T: RasterElement>(nodata: Option<T>) -> Option<T> {
    nodata.filter(|&nd| !(nd.same_as(T::zero()) || nd.same_as(T::one())))
}

/// Classify a source block into feature/background and valid/invalid cells.
///
/// - validity is `false` only where the sample equals the effective NoData
///   exactly (a NaN NoData matches NaN samples)
/// - a cell is a feature iff it is valid and its sample equals `1`
pub fn classify<T: RasterElement>(block: ArrayView2<'_, T>, nodata: Option<T>) -> MaskedBlock {
    let validity = match effective_nodata(nodata) {
        Some(nd) => block.mapv(|v| !v.same_as(nd)),
        None => Array2::from_elem(block.dim(), true),
    };

    let mut binary = Array2::from_elem(block.dim(), 1u8);
    Zip::from(&mut binary)
        .and(&block)
        .and(&validity)
        .for_each(|b, &v, &valid| {
            if valid && v == T::one() {
                *b = 0;
            }
        });

    MaskedBlock { binary, validity }
}

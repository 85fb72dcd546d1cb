//! # distmap algorithms
//!
//! Euclidean distance maps from feature rasters (rivers, roads, ...) that
//! never hold more than a bounded working set in memory.
//!
//! - **distance**: mask building, exact anisotropic distance transform,
//!   whole-grid (disk-backed) and tiled (padded) execution, result assembly
//! - **binarize**: normalization of arbitrary single-band rasters to 0/1

pub mod binarize;
pub mod distance;
pub(crate) mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::binarize::{binarize, binarize_block};
    pub use crate::distance::{
        classify, distance_map, distance_raster, euclidean_distance, DistanceParams,
        EuclideanDistance, NoProgress, ProgressObserver, RunState, RunSummary, Stage,
    };
    pub use distmap_core::prelude::*;
    pub use distmap_tiling::ExecutionStrategy;
}

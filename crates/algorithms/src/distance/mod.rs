//! Distance maps to feature cells
//!
//! A source raster is classified into feature (value `1`) and background
//! cells, and every valid cell receives the Euclidean distance to the
//! nearest feature in the physical units of the pixel spacing. Cells
//! marked NoData in the source come out as NaN.
//!
//! Two execution strategies are available, see [`DistanceParams`]:
//! - **whole-grid** (`tile_size == 0`): exact for any input size; binary,
//!   validity and distance grids live in scratch files and the transform
//!   runs strip by strip over them
//! - **tiled** (`tile_size > 0`): each tile is computed over a padded
//!   window in memory; exact wherever the nearest feature lies within the
//!   padding, an over-estimate elsewhere

mod assemble;
mod edt;
mod engine;
mod mask;
mod progress;

pub use assemble::{mask_invalid, stream_output, to_output};
pub use edt::{column_pass, euclidean_distance, row_pass, squared_distance_1d, LowerEnvelope};
pub use engine::{distance_map, distance_raster, DistanceParams, EuclideanDistance, RunSummary};
pub use mask::{classify, effective_nodata, MaskedBlock};
pub use progress::{NoProgress, ProgressObserver, RunState, Stage};

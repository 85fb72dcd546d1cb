//! # distmap tiling
//!
//! Region iteration and padding for out-of-core raster processing.
//!
//! This crate provides:
//! - `TileIterator`: row-major walk over native blocks or fixed-size tiles
//! - `PaddedTile`: a tile together with the enlarged region read around it
//! - `ExecutionStrategy`: whole-grid or tiled execution, chosen once per run

pub mod strategy;
pub mod tiled;

pub use strategy::ExecutionStrategy;
pub use tiled::{pad, PaddedTile, PaddedTiles, TileIterator};

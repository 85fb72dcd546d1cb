//! Execution strategy selection

use std::fmt;

/// How a distance map run is executed.
///
/// Selected once at the start of a run; the two paths share no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// Classify into disk-backed grids, transform the whole grid once,
    /// then stream the result in native blocks
    WholeGrid,
    /// Transform each `tile_size` tile independently over a region padded
    /// by `padding` cells, writing tiles straight to the output
    Tiled { tile_size: usize, padding: usize },
}

impl ExecutionStrategy {
    /// Tiled when `tile_size > 0`, whole-grid otherwise
    pub fn select(tile_size: usize, padding: usize) -> Self {
        if tile_size > 0 {
            ExecutionStrategy::Tiled { tile_size, padding }
        } else {
            ExecutionStrategy::WholeGrid
        }
    }

    pub fn is_tiled(&self) -> bool {
        matches!(self, ExecutionStrategy::Tiled { .. })
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExecutionStrategy::WholeGrid => "whole-grid",
            ExecutionStrategy::Tiled { .. } => "tiled",
        }
    }
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::WholeGrid
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::WholeGrid => write!(f, "whole-grid"),
            ExecutionStrategy::Tiled { tile_size, padding } => {
                write!(f, "tiled ({}px tiles, {}px padding)", tile_size, padding)
            }
        }
    }
}

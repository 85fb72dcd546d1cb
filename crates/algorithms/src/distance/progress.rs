//! Run states and progress reporting

use std::fmt;

/// Lifecycle of one distance-map run.
///
/// The whole-grid path walks `Idle → ClassifyingSource → ComputingDistance
/// → WritingOutput → Done`. The tiled path repeats the three middle states
/// once per tile. `Failed` is reachable from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    ClassifyingSource,
    ComputingDistance,
    WritingOutput,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::ClassifyingSource => "classifying source",
            RunState::ComputingDistance => "computing distance",
            RunState::WritingOutput => "writing output",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Unit of work being counted by a progress observer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Source blocks classified into scratch storage
    Classify,
    /// Column and row strips transformed in scratch storage
    Transform,
    /// Output blocks assembled and written
    Write,
    /// Padded tiles processed end to end
    Tiles,
    /// Source blocks normalized to 0/1
    Binarize,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Transform => "transform",
            Stage::Write => "write",
            Stage::Tiles => "tiles",
            Stage::Binarize => "binarize",
        }
    }
}

/// Receives progress notifications from a run.
///
/// All methods default to no-ops so observers implement only what they
/// display.
pub trait ProgressObserver {
    /// A stage starts with `total` units of work
    fn begin(&mut self, _stage: Stage, _total: usize) {}

    /// `steps` more units of the stage are complete
    fn advance(&mut self, _stage: Stage, _steps: usize) {}

    /// The stage completed
    fn finish(&mut self, _stage: Stage) {}

    /// The run moved to a new state
    fn state_changed(&mut self, _state: RunState) {}
}

/// Observer that ignores every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {}

impl<P: ProgressObserver + ?Sized> ProgressObserver for &mut P {
    fn begin(&mut self, stage: Stage, total: usize) {
        (**self).begin(stage, total)
    }

    fn advance(&mut self, stage: Stage, steps: usize) {
        (**self).advance(stage, steps)
    }

    fn finish(&mut self, stage: Stage) {
        (**self).finish(stage)
    }

    fn state_changed(&mut self, state: RunState) {
        (**self).state_changed(state)
    }
}

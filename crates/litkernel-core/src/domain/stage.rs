//! Pipeline stages and the controller's state machine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The four service-invoking stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stage 0: chapter-to-segment structure alignment.
    Structure,
    /// Stage 1: one representative passage per segment.
    Extraction,
    /// Stage 2A: macro narrative/rhetoric tagging.
    Macro,
    /// Stage 2B: literary-device tagging.
    Devices,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Structure,
        Stage::Extraction,
        Stage::Macro,
        Stage::Devices,
    ];

    /// Fixed identifier used in checkpoint file names.
    pub fn id(&self) -> &'static str {
        match self {
            Stage::Structure => "stage0",
            Stage::Extraction => "stage1",
            Stage::Macro => "stage2a",
            Stage::Devices => "stage2b",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// The stage that must be complete before this one may run.
    pub fn predecessor(self) -> Option<Stage> {
        match self {
            Stage::Structure => None,
            Stage::Extraction => Some(Stage::Structure),
            Stage::Macro => Some(Stage::Extraction),
            Stage::Devices => Some(Stage::Macro),
        }
    }

    /// This stage and every later one, in order.
    pub fn and_later(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().skip(self.index())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Error returned when a stage name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage {0:?} (expected stage0, stage1, stage2a or stage2b)")]
pub struct UnknownStage(pub String);

impl FromStr for Stage {
    type Err = UnknownStage;

    /// Accepts `stage0`, `0`, `stage2A`, `2b`, `structure`, `devices`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        let key = key.strip_prefix("stage").unwrap_or(&key).trim_start_matches(['_', '-', ' ']);
        match key {
            "0" | "structure" => Ok(Stage::Structure),
            "1" | "extraction" => Ok(Stage::Extraction),
            "2a" | "macro" => Ok(Stage::Macro),
            "2b" | "devices" => Ok(Stage::Devices),
            _ => Err(UnknownStage(s.to_string())),
        }
    }
}

/// Controller progress. Transitions happen strictly in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    NotStarted,
    Stage0Done,
    Stage1Done,
    Stage2ADone,
    Stage2BDone,
    Assembled,
}

impl PipelineState {
    /// State reached once `stage` has completed.
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Structure => PipelineState::Stage0Done,
            Stage::Extraction => PipelineState::Stage1Done,
            Stage::Macro => PipelineState::Stage2ADone,
            Stage::Devices => PipelineState::Stage2BDone,
        }
    }

    /// State the controller falls back to when `stage` is invalidated.
    pub fn before(stage: Stage) -> Self {
        match stage.predecessor() {
            Some(prev) => PipelineState::after(prev),
            None => PipelineState::NotStarted,
        }
    }

    /// Whether `stage` has completed in this state.
    pub fn has_completed(self, stage: Stage) -> bool {
        self >= PipelineState::after(stage)
    }
}

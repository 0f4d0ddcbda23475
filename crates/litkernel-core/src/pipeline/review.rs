//! Operator approval of validated stage output.

use crate::domain::stage::Stage;

/// Outcome of reviewing one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewDecision {
    Approve,
    Reject { reason: String },
}

/// Decides whether validated output may be checkpointed.
///
/// Called once per generated stage, after validation and before the
/// checkpoint is written. Resumed stages are not reviewed again.
pub trait StageReviewer: Send + Sync {
    fn review(&self, stage: Stage, summary: &str) -> ReviewDecision;
}

/// Approves everything. The library default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprove;

impl StageReviewer for AutoApprove {
    fn review(&self, _stage: Stage, _summary: &str) -> ReviewDecision {
        ReviewDecision::Approve
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_approve_approves() {
        assert_eq!(
            AutoApprove.review(Stage::Structure, "anything"),
            ReviewDecision::Approve
        );
    }
}

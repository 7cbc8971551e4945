//! Pipeline stage state machine
//!
//! `Init -> Perceiving -> Restoring -> Judging -> (Refining <-> Judging)* ->
//! Complete`. `Failed` is reachable from `Restoring` only, since restoration
//! is the one stage with no fail-open fallback. `Cancelled` is reachable from
//! any non-terminal stage, since cancellation takes effect at stage
//! boundaries.

use serde::{Deserialize, Serialize};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Init,
    Perceiving,
    Restoring,
    Judging,
    Refining,
    Complete,
    Failed,
    Cancelled,
}

impl Stage {
    /// Whether the stage is terminal
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Perceiving => "perceiving",
            Self::Restoring => "restoring",
            Self::Judging => "judging",
            Self::Refining => "refining",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Invalid stage transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid stage transition: {from} -> {to}")]
pub struct StageTransitionError {
    pub from: Stage,
    pub to: Stage,
}

/// Allowed successor stages
#[must_use]
pub fn allowed_transitions(from: Stage) -> &'static [Stage] {
    match from {
        Stage::Init => &[Stage::Perceiving, Stage::Cancelled],
        Stage::Perceiving => &[Stage::Restoring, Stage::Cancelled],
        Stage::Restoring => &[Stage::Judging, Stage::Failed, Stage::Cancelled],
        Stage::Judging => &[Stage::Complete, Stage::Refining, Stage::Cancelled],
        Stage::Refining => &[Stage::Judging, Stage::Cancelled],
        Stage::Complete | Stage::Failed | Stage::Cancelled => &[],
    }
}

/// Validate a transition
///
/// # Errors
/// Returns [`StageTransitionError`] when `to` is not an allowed successor.
pub fn validate_transition(from: Stage, to: Stage) -> Result<(), StageTransitionError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StageTransitionError { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        assert!(validate_transition(Stage::Init, Stage::Perceiving).is_ok());
        assert!(validate_transition(Stage::Perceiving, Stage::Restoring).is_ok());
        assert!(validate_transition(Stage::Restoring, Stage::Judging).is_ok());
        assert!(validate_transition(Stage::Judging, Stage::Refining).is_ok());
        assert!(validate_transition(Stage::Refining, Stage::Judging).is_ok());
        assert!(validate_transition(Stage::Judging, Stage::Complete).is_ok());
    }

    #[test]
    fn failed_reachable_from_restoring_only() {
        assert!(validate_transition(Stage::Restoring, Stage::Failed).is_ok());
        assert!(validate_transition(Stage::Perceiving, Stage::Failed).is_err());
        assert!(validate_transition(Stage::Judging, Stage::Failed).is_err());
        assert!(validate_transition(Stage::Refining, Stage::Failed).is_err());
    }

    #[test]
    fn perceiving_cannot_fail_the_run() {
        // The atlas builder never hard-fails; its only successor besides
        // cancellation is the restoring stage.
        assert_eq!(
            allowed_transitions(Stage::Perceiving),
            &[Stage::Restoring, Stage::Cancelled]
        );
    }

    #[test]
    fn cancellation_reachable_at_every_boundary() {
        for from in [Stage::Init, Stage::Perceiving, Stage::Restoring, Stage::Judging, Stage::Refining] {
            assert!(validate_transition(from, Stage::Cancelled).is_ok());
        }
    }

    #[test]
    fn terminal_stages_have_no_successors() {
        for stage in [Stage::Complete, Stage::Failed, Stage::Cancelled] {
            assert!(stage.is_terminal());
            assert!(allowed_transitions(stage).is_empty());
        }
        assert!(!Stage::Judging.is_terminal());
    }
}

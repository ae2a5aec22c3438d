use serde::{Deserialize, Serialize};

/// Position of a workflow in the upload -> proof set -> roots pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Idle,
    Uploading,
    Uploaded,
    CreatingProofSet,
    AwaitingConfirmation,
    ProofSetReady,
    AddingRoots,
    Completed,
    Failed,
}

impl Stage {
    pub const SEQUENCE: [Stage; 8] = [
        Stage::Idle,
        Stage::Uploading,
        Stage::Uploaded,
        Stage::CreatingProofSet,
        Stage::AwaitingConfirmation,
        Stage::ProofSetReady,
        Stage::AddingRoots,
        Stage::Completed,
    ];

    /// Index in [`Stage::SEQUENCE`]; `None` for `Failed`.
    pub fn ordinal(self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|stage| *stage == self)
    }

    /// Forward moves only (skipping is allowed when a resumed run already
    /// holds a stage's result), or a jump to `Failed` from a live stage.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self.ordinal(), next.ordinal()) {
            (_, None) => true,
            (Some(from), Some(to)) => to > from,
            (None, Some(_)) => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Uploading => "uploading",
            Stage::Uploaded => "uploaded",
            Stage::CreatingProofSet => "creating_proof_set",
            Stage::AwaitingConfirmation => "awaiting_confirmation",
            Stage::ProofSetReady => "proof_set_ready",
            Stage::AddingRoots => "adding_roots",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        }
    }

    /// Status line shown to whoever drives the workflow.
    pub fn status_text(self) -> &'static str {
        match self {
            Stage::Idle => "Ready",
            Stage::Uploading => "Uploading file...",
            Stage::Uploaded => "Uploaded successfully",
            Stage::CreatingProofSet => "Creating proof set...",
            Stage::AwaitingConfirmation => "Waiting for proof set confirmation...",
            Stage::ProofSetReady => "Proof set ready",
            Stage::AddingRoots => "Adding roots...",
            Stage::Completed => "Roots added successfully",
            Stage::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

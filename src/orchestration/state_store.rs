use crate::orchestration::error::StateError;
use crate::orchestration::stage::Stage;
use crate::shared::fs_atomic::atomic_write_file;
use crate::shared::ids::WorkflowKey;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Resumable record of one file's workflow.
///
/// The three identifiers are write-once and must arrive in causal order:
/// content id, then confirmation reference, then proof-set id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    content_id: Option<String>,
    #[serde(default)]
    confirmation_ref: Option<String>,
    #[serde(default)]
    proof_set_id: Option<u64>,
    #[serde(default)]
    roots_added: bool,
    #[serde(default)]
    stage: Stage,
    #[serde(default)]
    terminal_reason: Option<String>,
    #[serde(default)]
    status_text: String,
    #[serde(default)]
    poll_attempts: u32,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
}

impl WorkflowState {
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn confirmation_ref(&self) -> Option<&str> {
        self.confirmation_ref.as_deref()
    }

    pub fn proof_set_id(&self) -> Option<u64> {
        self.proof_set_id
    }

    /// True once add-roots succeeded, even if the final event is unsent.
    pub fn roots_added(&self) -> bool {
        self.roots_added
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn terminal_reason(&self) -> Option<&str> {
        self.terminal_reason.as_deref()
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn poll_attempts(&self) -> u32 {
        self.poll_attempts
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    pub fn updated_at(&self) -> Option<&str> {
        self.updated_at.as_deref()
    }

    pub fn set_content_id(&mut self, value: impl Into<String>) -> Result<(), StateError> {
        let value = value.into();
        write_once("contentId", &mut self.content_id, value)
    }

    pub fn set_confirmation_ref(&mut self, value: impl Into<String>) -> Result<(), StateError> {
        if self.content_id.is_none() {
            return Err(StateError::OutOfOrder {
                field: "confirmationRef",
                requires: "contentId",
            });
        }
        write_once("confirmationRef", &mut self.confirmation_ref, value.into())
    }

    pub fn set_proof_set_id(&mut self, value: u64) -> Result<(), StateError> {
        if self.confirmation_ref.is_none() {
            return Err(StateError::OutOfOrder {
                field: "proofSetId",
                requires: "confirmationRef",
            });
        }
        match self.proof_set_id {
            Some(existing) if existing != value => Err(StateError::FieldAlreadySet {
                field: "proofSetId",
                existing: existing.to_string(),
            }),
            _ => {
                self.proof_set_id = Some(value);
                Ok(())
            }
        }
    }

    pub fn mark_roots_added(&mut self) -> Result<(), StateError> {
        if self.proof_set_id.is_none() {
            return Err(StateError::OutOfOrder {
                field: "rootsAdded",
                requires: "proofSetId",
            });
        }
        self.roots_added = true;
        Ok(())
    }

    /// Moves the stage forward and refreshes the status line.
    pub fn advance(&mut self, next: Stage) -> Result<(), StateError> {
        if next == Stage::Failed || !self.stage.can_transition_to(next) {
            return Err(StateError::InvalidTransition {
                from: self.stage,
                to: next,
            });
        }
        self.stage = next;
        self.status_text = next.status_text().to_string();
        Ok(())
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        if !self.stage.can_transition_to(Stage::Failed) {
            return Err(StateError::InvalidTransition {
                from: self.stage,
                to: Stage::Failed,
            });
        }
        let reason = reason.into();
        self.stage = Stage::Failed;
        self.status_text = format!("Failed: {reason}");
        self.terminal_reason = Some(reason);
        Ok(())
    }

    /// Opens a new run attempt. Identifiers are kept so finished stages are
    /// skipped; the stage restarts from `Idle`.
    pub fn begin_attempt(&mut self, run_id: impl Into<String>, file: impl Into<String>) {
        self.run_id = Some(run_id.into());
        self.file = Some(file.into());
        self.stage = Stage::Idle;
        self.terminal_reason = None;
        self.status_text = Stage::Idle.status_text().to_string();
    }

    pub fn record_poll_attempts(&mut self, attempts: u32) {
        self.poll_attempts = self.poll_attempts.saturating_add(attempts);
    }

    pub fn set_status_text(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
    }

    pub fn touch(&mut self, now: impl Into<String>) {
        self.updated_at = Some(now.into());
    }

    fn check_causal_order(&self) -> Result<(), String> {
        if self.confirmation_ref.is_some() && self.content_id.is_none() {
            return Err("confirmationRef is set without contentId".to_string());
        }
        if self.proof_set_id.is_some() && self.confirmation_ref.is_none() {
            return Err("proofSetId is set without confirmationRef".to_string());
        }
        if self.roots_added && self.proof_set_id.is_none() {
            return Err("rootsAdded is set without proofSetId".to_string());
        }
        if self.stage == Stage::Completed && !self.roots_added {
            return Err("stage is completed but roots were never added".to_string());
        }
        Ok(())
    }
}

fn write_once(
    field: &'static str,
    slot: &mut Option<String>,
    value: String,
) -> Result<(), StateError> {
    match slot {
        Some(existing) if *existing != value => Err(StateError::FieldAlreadySet {
            field,
            existing: existing.clone(),
        }),
        _ => {
            *slot = Some(value);
            Ok(())
        }
    }
}

/// File-backed store with one directory per workflow key.
#[derive(Debug, Clone)]
pub struct WorkflowStateStore {
    state_root: PathBuf,
}

impl WorkflowStateStore {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            state_root: state_root.into(),
        }
    }

    pub fn state_root(&self) -> &Path {
        &self.state_root
    }

    pub fn workflows_dir(&self) -> PathBuf {
        self.state_root.join("workflows")
    }

    pub fn workflow_dir(&self, key: &WorkflowKey) -> PathBuf {
        self.workflows_dir().join(key.as_str())
    }

    pub fn state_path(&self, key: &WorkflowKey) -> PathBuf {
        self.workflow_dir(key).join("state.json")
    }

    pub fn transcript_path(&self, key: &WorkflowKey) -> PathBuf {
        self.workflow_dir(key).join("commands.log")
    }

    /// Returns an empty `Idle` record when nothing was persisted yet.
    pub fn load(&self, key: &WorkflowKey) -> Result<WorkflowState, StateError> {
        let path = self.state_path(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(WorkflowState::default()),
            Err(source) => {
                return Err(StateError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        let state: WorkflowState =
            serde_json::from_str(&raw).map_err(|source| StateError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        state
            .check_causal_order()
            .map_err(|reason| StateError::Corrupt {
                path: path.display().to_string(),
                reason,
            })?;
        Ok(state)
    }

    /// Full overwrite of the record; concurrent readers see old or new bytes.
    pub fn save(&self, key: &WorkflowKey, state: &WorkflowState) -> Result<(), StateError> {
        let path = self.state_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StateError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let body = serde_json::to_vec_pretty(state).map_err(|source| StateError::Encode {
            path: path.display().to_string(),
            source,
        })?;
        atomic_write_file(&path, &body).map_err(|source| StateError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    /// Drops the persisted record so the next run starts fresh. Returns
    /// whether a record existed.
    pub fn clear(&self, key: &WorkflowKey) -> Result<bool, StateError> {
        let path = self.state_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StateError::Write {
                path: path.display().to_string(),
                source,
            }),
        }
    }

    /// All persisted workflows, sorted by key.
    pub fn list(&self) -> Result<Vec<(WorkflowKey, WorkflowState)>, StateError> {
        let dir = self.workflows_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Read {
                    path: dir.display().to_string(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateError::Read {
                path: dir.display().to_string(),
                source,
            })?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let Ok(key) = WorkflowKey::parse(&name) else {
                continue;
            };
            if self.state_path(&key).is_file() {
                keys.push(key);
            }
        }
        keys.sort();

        keys.into_iter()
            .map(|key| {
                let state = self.load(&key)?;
                Ok((key, state))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_must_follow_causal_order() {
        let mut state = WorkflowState::default();
        assert!(matches!(
            state.set_confirmation_ref("0xabc"),
            Err(StateError::OutOfOrder { .. })
        ));
        assert!(matches!(
            state.set_proof_set_id(1),
            Err(StateError::OutOfOrder { .. })
        ));
        state.set_content_id("baga1:x").expect("content id");
        state.set_confirmation_ref("0xabc").expect("ref");
        state.set_proof_set_id(9).expect("id");
        assert_eq!(state.proof_set_id(), Some(9));
    }

    #[test]
    fn identifiers_are_write_once() {
        let mut state = WorkflowState::default();
        state.set_content_id("baga1:x").expect("first");
        state.set_content_id("baga1:x").expect("same value is not an overwrite");
        assert!(matches!(
            state.set_content_id("baga2:y"),
            Err(StateError::FieldAlreadySet { field: "contentId", .. })
        ));
        assert_eq!(state.content_id(), Some("baga1:x"));
    }

    #[test]
    fn advance_rejects_regression_and_failed() {
        let mut state = WorkflowState::default();
        state.advance(Stage::Uploading).expect("forward");
        assert!(state.advance(Stage::Idle).is_err());
        assert!(state.advance(Stage::Failed).is_err());
        state.fail("boom").expect("fail");
        assert_eq!(state.stage(), Stage::Failed);
        assert_eq!(state.terminal_reason(), Some("boom"));
        assert!(state.fail("again").is_err());
    }

    #[test]
    fn begin_attempt_keeps_identifiers() {
        let mut state = WorkflowState::default();
        state.set_content_id("baga1:x").expect("content id");
        state.advance(Stage::Uploaded).expect("advance");
        state.fail("publish failed").expect("fail");
        state.begin_attempt("run-2", "a.jpg");
        assert_eq!(state.stage(), Stage::Idle);
        assert_eq!(state.terminal_reason(), None);
        assert_eq!(state.content_id(), Some("baga1:x"));
        assert_eq!(state.run_id(), Some("run-2"));
    }
}

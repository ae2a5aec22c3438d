use crate::config::{load_settings_with, read_settings_with, ConfigError, Settings};
use crate::orchestration::{WorkflowState, WorkflowStateStore};
use crate::shared::ids::WorkflowKey;
use std::path::{Path, PathBuf};

/// Options shared by every verb.
#[derive(Debug, Clone, Default)]
pub struct CliContext {
    pub config: Option<PathBuf>,
}

pub fn map_config_err(err: ConfigError) -> String {
    err.to_string()
}

fn env_lookup(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

/// Settings for verbs that talk to the storage provider.
pub fn load_settings(ctx: &CliContext) -> Result<Settings, String> {
    load_settings_with(ctx.config.as_deref(), env_lookup).map_err(map_config_err)
}

/// Settings for verbs that only touch local state.
pub fn read_settings(ctx: &CliContext) -> Result<Settings, String> {
    read_settings_with(ctx.config.as_deref(), env_lookup).map_err(map_config_err)
}

pub fn state_store(settings: &Settings) -> Result<WorkflowStateStore, String> {
    let root = settings.resolve_state_root().map_err(map_config_err)?;
    Ok(WorkflowStateStore::new(root))
}

pub fn workflow_key_for(file: &str) -> Result<WorkflowKey, String> {
    WorkflowKey::for_file(Path::new(file)).map_err(|err| format!("failed to read {file}: {err}"))
}

pub fn render_state(key: &WorkflowKey, state: &WorkflowState) -> String {
    let mut lines = vec![
        format!("key={key}"),
        format!("file={}", state.file().unwrap_or("-")),
        format!("stage={}", state.stage()),
        format!("status={}", state.status_text()),
        format!("content_id={}", state.content_id().unwrap_or("-")),
        format!("confirmation_ref={}", state.confirmation_ref().unwrap_or("-")),
        format!(
            "proof_set_id={}",
            state
                .proof_set_id()
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string())
        ),
        format!("roots_added={}", state.roots_added()),
        format!("poll_attempts={}", state.poll_attempts()),
    ];
    if let Some(reason) = state.terminal_reason() {
        lines.push(format!("terminal_reason={reason}"));
    }
    if let Some(run_id) = state.run_id() {
        lines.push(format!("run_id={run_id}"));
    }
    if let Some(updated_at) = state.updated_at() {
        lines.push(format!("updated_at={updated_at}"));
    }
    lines.join("\n")
}

pub fn require_single_file(args: &[String], usage: &str) -> Result<String, String> {
    match args {
        [file] if !file.trim().is_empty() => Ok(file.clone()),
        _ => Err(format!("usage: {usage}")),
    }
}

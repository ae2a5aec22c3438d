use crate::orchestration::stage::Stage;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read workflow state {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse workflow state {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode workflow state {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write workflow state {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("workflow state {path} is inconsistent: {reason}")]
    Corrupt { path: String, reason: String },
    #[error("`{field}` is already set to `{existing}`")]
    FieldAlreadySet { field: &'static str, existing: String },
    #[error("`{field}` cannot be set before `{requires}`")]
    OutOfOrder {
        field: &'static str,
        requires: &'static str,
    },
    #[error("workflow stage transition `{from}` -> `{to}` is invalid")]
    InvalidTransition { from: Stage, to: Stage },
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to read input file {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("workflow `{key}` is already being processed by pid {pid}")]
    Locked { key: String, pid: u32 },
    #[error("failed to manage workflow lock {path}: {source}")]
    Lock {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to allocate run id: {0}")]
    RunId(String),
    #[error("workflow worker stopped unexpectedly: {0}")]
    Worker(String),
}

use crate::orchestration::error::WorkflowError;
use crate::orchestration::events::EventPublisher;
use crate::orchestration::polling::CancellationToken;
use crate::orchestration::stage::Stage;
use crate::orchestration::workflow_engine::{
    RunOutcome, StatusListener, StatusUpdate, WorkflowEngine,
};
use crate::tool::CommandRunner;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub stage: Stage,
    pub message: String,
    /// Every status line seen so far, oldest first.
    pub history: Vec<String>,
}

/// Listener that keeps the latest status where another thread can read it.
#[derive(Debug, Clone, Default)]
pub struct SharedStatus {
    inner: Arc<Mutex<StatusSnapshot>>,
}

impl SharedStatus {
    pub fn snapshot(&self) -> StatusSnapshot {
        match self.inner.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl StatusListener for SharedStatus {
    fn on_status(&self, update: &StatusUpdate) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.stage = update.stage;
        guard.message = update.message.clone();
        guard.history.push(update.message.clone());
    }
}

/// A workflow running on its own thread.
pub struct WorkflowHandle {
    status: SharedStatus,
    cancel: CancellationToken,
    join: JoinHandle<Result<RunOutcome, WorkflowError>>,
}

impl WorkflowHandle {
    pub fn status(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    /// Requests a stop; the engine fails the run at its next checkpoint.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<RunOutcome, WorkflowError> {
        self.join
            .join()
            .map_err(|_| WorkflowError::Worker("workflow thread panicked".to_string()))?
    }
}

/// Dispatches `engine.run(source)` onto a dedicated thread so the caller
/// stays responsive. The engine's listener and cancellation are replaced by
/// the handle's.
pub fn spawn_workflow<R, P>(
    engine: WorkflowEngine<R, P>,
    source: impl Into<PathBuf>,
) -> Result<WorkflowHandle, WorkflowError>
where
    R: CommandRunner + Send + 'static,
    P: EventPublisher + Send + 'static,
{
    let status = SharedStatus::default();
    let cancel = CancellationToken::new();
    let engine = engine
        .with_status_listener(Box::new(status.clone()))
        .with_cancellation(cancel.clone());
    let source = source.into();

    let join = thread::Builder::new()
        .name("pdpflow-workflow".to_string())
        .spawn(move || engine.run(&source))
        .map_err(|err| WorkflowError::Worker(err.to_string()))?;

    Ok(WorkflowHandle {
        status,
        cancel,
        join,
    })
}

use crate::orchestration::error::WorkflowError;
use crate::orchestration::events::{EventPublisher, StageEvent};
use crate::orchestration::lock::WorkflowLock;
use crate::orchestration::polling::{
    poll_until_confirmed, CancellationToken, PollOutcome, PollPolicy,
};
use crate::orchestration::stage::Stage;
use crate::orchestration::state_store::{WorkflowState, WorkflowStateStore};
use crate::shared::fs_atomic::stage_file_copy;
use crate::shared::ids::{generate_run_id, WorkflowKey};
use crate::shared::logging::{append_line, append_workflow_log, now_rfc3339, now_secs};
use crate::tool::{
    parse_confirmation_ref, parse_content_id, parse_proof_set_id, CombinedOutput, CommandError,
    CommandRunner, ToolCommand, ToolContext,
};
use std::path::{Path, PathBuf};

pub const REASON_UPLOAD_NO_ID: &str = "upload: no identifier found";
pub const REASON_CREATE_NO_REF: &str = "proof-set creation: no reference found";
pub const REASON_ADD_ROOTS: &str = "add-roots command error";
pub const REASON_CANCELLED: &str = "cancelled";

/// Result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed {
        key: WorkflowKey,
        state: WorkflowState,
    },
    /// The ledger has not confirmed the proof set within the poll budget.
    /// Running again resumes polling with the stored reference.
    Pending {
        key: WorkflowKey,
        state: WorkflowState,
        attempts: u32,
    },
    Failed {
        key: WorkflowKey,
        state: WorkflowState,
        reason: String,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            RunOutcome::Completed { state, .. }
            | RunOutcome::Pending { state, .. }
            | RunOutcome::Failed { state, .. } => state,
        }
    }

    pub fn key(&self) -> &WorkflowKey {
        match self {
            RunOutcome::Completed { key, .. }
            | RunOutcome::Pending { key, .. }
            | RunOutcome::Failed { key, .. } => key,
        }
    }

    pub fn summary(&self) -> String {
        match self {
            RunOutcome::Completed { state, .. } => format!(
                "completed: proof set {} holds root {}",
                state.proof_set_id().unwrap_or_default(),
                state.content_id().unwrap_or_default()
            ),
            RunOutcome::Pending { attempts, .. } => format!(
                "pending: proof set not confirmed after {attempts} status checks; run again to keep waiting"
            ),
            RunOutcome::Failed { reason, .. } => format!("failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub key: WorkflowKey,
    pub stage: Stage,
    pub message: String,
}

/// Receives a human readable status line on every stage change.
pub trait StatusListener {
    fn on_status(&self, update: &StatusUpdate);
}

/// Drives one file through upload, proof-set creation, confirmation and
/// add-roots. Owns all stage decisions; collaborators only report outcomes.
pub struct WorkflowEngine<R, P> {
    store: WorkflowStateStore,
    tool: ToolContext,
    staging_dir: PathBuf,
    runner: R,
    publisher: P,
    poll_policy: PollPolicy,
    cancel: CancellationToken,
    listener: Option<Box<dyn StatusListener + Send>>,
}

enum Step {
    Continue,
    Stop(RunOutcome),
}

type StageFn<R, P> = fn(
    &WorkflowEngine<R, P>,
    &RunContext<'_>,
    &mut WorkflowState,
) -> Result<Step, WorkflowError>;

struct RunContext<'a> {
    key: &'a WorkflowKey,
    file_name: &'a str,
    source: &'a Path,
}

impl<R: CommandRunner, P: EventPublisher> WorkflowEngine<R, P> {
    pub fn new(
        store: WorkflowStateStore,
        tool: ToolContext,
        staging_dir: impl Into<PathBuf>,
        runner: R,
        publisher: P,
    ) -> Self {
        Self {
            store,
            tool,
            staging_dir: staging_dir.into(),
            runner,
            publisher,
            poll_policy: PollPolicy::default(),
            cancel: CancellationToken::new(),
            listener: None,
        }
    }

    pub fn with_poll_policy(mut self, poll_policy: PollPolicy) -> Self {
        self.poll_policy = poll_policy;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_status_listener(mut self, listener: Box<dyn StatusListener + Send>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Runs (or resumes) the workflow for `source`. Stages whose results are
    /// already persisted for this file are not executed again.
    pub fn run(&self, source: &Path) -> Result<RunOutcome, WorkflowError> {
        let input_error = |source_err: std::io::Error| WorkflowError::Input {
            path: source.display().to_string(),
            source: source_err,
        };
        let file_name = source
            .file_name()
            .and_then(|v| v.to_str())
            .map(str::to_string)
            .ok_or_else(|| input_error(std::io::Error::other("path has no usable file name")))?;
        let key = WorkflowKey::for_file(source).map_err(input_error)?;

        let _lock = WorkflowLock::acquire(&self.store.workflow_dir(&key), key.as_str())?;
        let mut state = self.store.load(&key)?;

        if state.stage() == Stage::Completed {
            self.log("info", "workflow.already_completed", &key, "nothing to do");
            return Ok(RunOutcome::Completed { key, state });
        }

        let run_id = generate_run_id(now_secs()).map_err(WorkflowError::RunId)?;
        self.log(
            "info",
            "workflow.start",
            &key,
            &format!("run_id={run_id} file={file_name} resumed_from={}", state.stage()),
        );
        state.begin_attempt(run_id, file_name.as_str());

        let ctx = RunContext {
            key: &key,
            file_name: &file_name,
            source,
        };
        let stages: [StageFn<R, P>; 4] = [
            Self::upload_stage,
            Self::proof_set_stage,
            Self::add_roots_stage,
            Self::finish_stage,
        ];
        for stage in stages {
            if self.cancel.is_cancelled() {
                return self.fail(&ctx, &mut state, REASON_CANCELLED);
            }
            if let Step::Stop(outcome) = stage(self, &ctx, &mut state)? {
                return Ok(outcome);
            }
        }

        Ok(RunOutcome::Completed { key, state })
    }

    fn upload_stage(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
    ) -> Result<Step, WorkflowError> {
        if let Err(err) = stage_file_copy(ctx.source, &self.staging_dir) {
            return self
                .fail(ctx, state, &format!("staging: {err}"))
                .map(Step::Stop);
        }
        self.enter(ctx, state, Stage::Uploading)?;

        if state.content_id().is_some() {
            self.log("info", "workflow.upload.skipped", ctx.key, "content id already stored");
        } else {
            let output = match self.execute(ctx, self.tool.upload_file(ctx.file_name)) {
                Ok(output) => output,
                Err(err) => return self.fail(ctx, state, &format!("upload: {err}")).map(Step::Stop),
            };
            let Some(content_id) = parse_content_id(&output.text()) else {
                return self.fail(ctx, state, REASON_UPLOAD_NO_ID).map(Step::Stop);
            };
            state.set_content_id(content_id)?;
        }

        self.enter(ctx, state, Stage::Uploaded)?;
        self.persist(ctx, state)?;
        let content_id = state.content_id().unwrap_or_default().to_string();
        self.announce(ctx, state, StageEvent::uploaded(ctx.file_name, &content_id))
    }

    fn proof_set_stage(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
    ) -> Result<Step, WorkflowError> {
        if state.proof_set_id().is_some() {
            self.log(
                "info",
                "workflow.proof_set.skipped",
                ctx.key,
                "proof set id already stored",
            );
            return Ok(Step::Continue);
        }

        if state.confirmation_ref().is_none() {
            self.enter(ctx, state, Stage::CreatingProofSet)?;
            let output = match self.execute(ctx, self.tool.create_proof_set()) {
                Ok(output) => output,
                Err(err) => {
                    return self
                        .fail(ctx, state, &format!("proof-set creation: {err}"))
                        .map(Step::Stop)
                }
            };
            let Some(reference) = parse_confirmation_ref(&output.text()) else {
                return self.fail(ctx, state, REASON_CREATE_NO_REF).map(Step::Stop);
            };
            state.set_confirmation_ref(reference)?;
            self.enter(ctx, state, Stage::AwaitingConfirmation)?;
            self.persist(ctx, state)?;
        } else {
            self.enter(ctx, state, Stage::AwaitingConfirmation)?;
        }

        let reference = state.confirmation_ref().unwrap_or_default().to_string();
        let status_command = match self.tool.proof_set_create_status(&reference) {
            Ok(command) => command,
            Err(err) => {
                return self
                    .fail(ctx, state, &format!("confirmation: {err}"))
                    .map(Step::Stop)
            }
        };

        let polled = poll_until_confirmed(&self.poll_policy, &self.cancel, |attempt| {
            self.log(
                "debug",
                "workflow.confirmation.poll",
                ctx.key,
                &format!("attempt={attempt} tx_hash={reference}"),
            );
            let output = self.execute(ctx, Ok(status_command.clone()))?;
            Ok::<_, CommandError>(parse_proof_set_id(&output.text()))
        });

        match polled {
            Ok(PollOutcome::Confirmed {
                proof_set_id,
                attempts,
            }) => {
                state.record_poll_attempts(attempts);
                state.set_proof_set_id(proof_set_id)?;
                self.enter_with_status(
                    ctx,
                    state,
                    Stage::ProofSetReady,
                    Some(format!("Proof set ready: {proof_set_id}")),
                )?;
                self.persist(ctx, state)?;
                Ok(Step::Continue)
            }
            Ok(PollOutcome::Pending { attempts }) => {
                state.record_poll_attempts(attempts);
                state.set_status_text(format!(
                    "Still waiting for proof set confirmation after {attempts} checks"
                ));
                self.persist(ctx, state)?;
                self.log(
                    "warn",
                    "workflow.confirmation.pending",
                    ctx.key,
                    &format!("attempts={attempts} tx_hash={reference}"),
                );
                self.notify(ctx, state);
                Ok(Step::Stop(RunOutcome::Pending {
                    key: ctx.key.clone(),
                    state: state.clone(),
                    attempts,
                }))
            }
            Ok(PollOutcome::Cancelled { attempts }) => {
                state.record_poll_attempts(attempts);
                self.fail(ctx, state, REASON_CANCELLED).map(Step::Stop)
            }
            Err(err) => self
                .fail(ctx, state, &format!("confirmation: {err}"))
                .map(Step::Stop),
        }
    }

    fn add_roots_stage(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
    ) -> Result<Step, WorkflowError> {
        let Some(proof_set_id) = state.proof_set_id() else {
            return self
                .fail(ctx, state, "add-roots: proof set id missing")
                .map(Step::Stop);
        };
        self.enter(ctx, state, Stage::AddingRoots)?;

        if state.roots_added() {
            self.log("info", "workflow.add_roots.skipped", ctx.key, "roots already added");
            return Ok(Step::Continue);
        }

        let root = state.content_id().unwrap_or_default().to_string();
        match self.execute(ctx, self.tool.add_roots(proof_set_id, &root)) {
            Ok(output) if output.exited_successfully() => {}
            Ok(output) => {
                self.log(
                    "error",
                    "workflow.add_roots.exit",
                    ctx.key,
                    &format!("exit_code={:?}", output.exit_code),
                );
                return self.fail(ctx, state, REASON_ADD_ROOTS).map(Step::Stop);
            }
            Err(err) => {
                return self
                    .fail(ctx, state, &format!("{REASON_ADD_ROOTS}: {err}"))
                    .map(Step::Stop)
            }
        }

        state.mark_roots_added()?;
        self.persist(ctx, state)?;
        Ok(Step::Continue)
    }

    fn finish_stage(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
    ) -> Result<Step, WorkflowError> {
        let content_id = state.content_id().unwrap_or_default().to_string();
        let proof_set_id = state.proof_set_id().unwrap_or_default();
        if let Step::Stop(outcome) = self.announce(
            ctx,
            state,
            StageEvent::roots_added(ctx.file_name, &content_id, proof_set_id),
        )? {
            return Ok(Step::Stop(outcome));
        }

        self.enter(ctx, state, Stage::Completed)?;
        self.persist(ctx, state)?;
        self.log(
            "info",
            "workflow.completed",
            ctx.key,
            &format!("proof_set_id={proof_set_id} root={content_id}"),
        );
        Ok(Step::Continue)
    }

    fn enter(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
        next: Stage,
    ) -> Result<(), WorkflowError> {
        self.enter_with_status(ctx, state, next, None)
    }

    /// Advances and notifies listeners. `status` replaces the stage's
    /// default status text.
    fn enter_with_status(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
        next: Stage,
        status: Option<String>,
    ) -> Result<(), WorkflowError> {
        state.advance(next)?;
        if let Some(text) = status {
            state.set_status_text(text);
        }
        self.log("info", "workflow.stage", ctx.key, next.as_str());
        self.notify(ctx, state);
        Ok(())
    }

    fn persist(&self, ctx: &RunContext<'_>, state: &mut WorkflowState) -> Result<(), WorkflowError> {
        state.touch(now_rfc3339());
        self.store.save(ctx.key, state)?;
        Ok(())
    }

    /// Publishes after the state carrying the event's data is persisted.
    fn announce(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
        event: StageEvent,
    ) -> Result<Step, WorkflowError> {
        match self.publisher.publish(&event) {
            Ok(ack) => {
                self.log(
                    "info",
                    "workflow.event.acknowledged",
                    ctx.key,
                    &format!("stage={} ack={}", event.stage, ack.payload),
                );
                Ok(Step::Continue)
            }
            Err(err) => self
                .fail(ctx, state, &format!("publish {}: {err}", event.stage))
                .map(Step::Stop),
        }
    }

    fn fail(
        &self,
        ctx: &RunContext<'_>,
        state: &mut WorkflowState,
        reason: &str,
    ) -> Result<RunOutcome, WorkflowError> {
        state.fail(reason)?;
        self.persist(ctx, state)?;
        self.log("error", "workflow.failed", ctx.key, reason);
        self.notify(ctx, state);
        Ok(RunOutcome::Failed {
            key: ctx.key.clone(),
            state: state.clone(),
            reason: reason.to_string(),
        })
    }

    fn execute(
        &self,
        ctx: &RunContext<'_>,
        command: Result<ToolCommand, CommandError>,
    ) -> Result<CombinedOutput, CommandError> {
        let command = command?;
        let command_form = command.command_form();
        self.log("info", "command.start", ctx.key, &command_form);
        let transcript = self.store.transcript_path(ctx.key);
        let _ = append_line(&transcript, &format!("> {command_form}"));

        let output = match self.runner.run(&command) {
            Ok(output) => output,
            Err(err) => {
                let _ = append_line(&transcript, &format!("! {err}"));
                self.log("error", "command.launch_failed", ctx.key, &err.to_string());
                return Err(err);
            }
        };

        let _ = append_line(&transcript, output.text().trim_end());
        self.log(
            "info",
            "command.finish",
            ctx.key,
            &format!(
                "exit_code={:?} stdout_bytes={} stderr_bytes={}",
                output.exit_code,
                output.stdout.len(),
                output.stderr.len()
            ),
        );
        Ok(output)
    }

    fn notify(&self, ctx: &RunContext<'_>, state: &WorkflowState) {
        if let Some(listener) = &self.listener {
            listener.on_status(&StatusUpdate {
                key: ctx.key.clone(),
                stage: state.stage(),
                message: state.status_text().to_string(),
            });
        }
    }

    fn log(&self, level: &str, event: &str, key: &WorkflowKey, message: &str) {
        append_workflow_log(
            self.store.state_root(),
            level,
            event,
            &format!("key={key} {message}"),
        );
    }
}

use crate::app::command_support::{
    load_settings, map_config_err, read_settings, render_state, require_single_file, state_store,
    workflow_key_for, CliContext,
};
use crate::orchestration::lock::WorkflowLock;
use crate::orchestration::{spawn_workflow, RunOutcome, WorkflowEngine};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

const STATUS_REFRESH: Duration = Duration::from_millis(200);

pub fn cmd_run(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    let file = require_single_file(args, "run <file> [--config <path>]")?;
    let source = PathBuf::from(&file);
    if !source.is_file() {
        return Err(format!("input file `{file}` does not exist"));
    }

    let settings = load_settings(ctx)?;
    let store = state_store(&settings)?;
    let staging_dir = settings.resolve_staging_dir().map_err(map_config_err)?;
    let tool = settings.tool_context().map_err(map_config_err)?;
    let engine = WorkflowEngine::new(
        store,
        tool,
        staging_dir,
        settings.process_runner(),
        settings.publisher(),
    )
    .with_poll_policy(settings.poll_policy());

    let handle = spawn_workflow(engine, source).map_err(|err| err.to_string())?;
    let mut printed = 0usize;
    loop {
        let finished = handle.is_finished();
        let snapshot = handle.status();
        for line in snapshot.history.iter().skip(printed) {
            eprintln!("{line}");
        }
        printed = snapshot.history.len();
        if finished {
            break;
        }
        thread::sleep(STATUS_REFRESH);
    }

    let outcome = handle.join().map_err(|err| err.to_string())?;
    let headline = format!("workflow {} {}", outcome.key(), outcome.summary());
    match outcome {
        RunOutcome::Failed { .. } => Err(headline),
        RunOutcome::Completed { key, state } | RunOutcome::Pending { key, state, .. } => {
            Ok(format!("{headline}\n{}", render_state(&key, &state)))
        }
    }
}

pub fn cmd_state(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    let file = require_single_file(args, "state <file>")?;
    let key = workflow_key_for(&file)?;
    let store = state_store(&read_settings(ctx)?)?;
    if !store.state_path(&key).is_file() {
        return Ok(format!("no workflow state for {file} (key={key})"));
    }
    let state = store.load(&key).map_err(|err| err.to_string())?;
    Ok(render_state(&key, &state))
}

pub fn cmd_reset(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    let file = require_single_file(args, "reset <file>")?;
    let key = workflow_key_for(&file)?;
    let store = state_store(&read_settings(ctx)?)?;
    let _lock = WorkflowLock::acquire(&store.workflow_dir(&key), key.as_str())
        .map_err(|err| err.to_string())?;
    if store.clear(&key).map_err(|err| err.to_string())? {
        Ok(format!("reset workflow {key}"))
    } else {
        Ok(format!("no workflow state for {file} (key={key})"))
    }
}

pub fn cmd_list(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    if !args.is_empty() {
        return Err("usage: list".to_string());
    }
    let store = state_store(&read_settings(ctx)?)?;
    let workflows = store.list().map_err(|err| err.to_string())?;
    if workflows.is_empty() {
        return Ok("no workflows".to_string());
    }
    Ok(workflows
        .iter()
        .map(|(key, state)| {
            format!(
                "{key} stage={} file={}",
                state.stage(),
                state.file().unwrap_or("-")
            )
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

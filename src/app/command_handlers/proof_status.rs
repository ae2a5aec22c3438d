use crate::app::command_support::{
    read_settings, require_single_file, state_store, workflow_key_for, CliContext,
};

pub fn cmd_proof_status(ctx: &CliContext, args: &[String]) -> Result<String, String> {
    let file = require_single_file(args, "proof-status <file>")?;
    let key = workflow_key_for(&file)?;
    let settings = read_settings(ctx)?;
    let state = state_store(&settings)?
        .load(&key)
        .map_err(|err| err.to_string())?;

    let (Some(proof_set_id), Some(content_id)) = (state.proof_set_id(), state.content_id()) else {
        return Err(format!(
            "workflow {key} has no proof set yet (stage={})",
            state.stage()
        ));
    };
    if !state.roots_added() {
        return Err(format!(
            "workflow {key} has not added its root to proof set {proof_set_id} yet"
        ));
    }

    let name = state.file().unwrap_or(file.as_str());
    match settings
        .explorer_client()
        .root_status(proof_set_id, content_id)
        .map_err(|err| err.to_string())?
    {
        Some(status) => Ok(format!("{name},{status}")),
        None => Ok(format!(
            "{name}: root not listed in proof set {proof_set_id} yet"
        )),
    }
}

use crate::tool::{CommandError, ToolCommand};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_TOOL_IMAGE: &str = "ghcr.io/lesnyrumcajs/pdptool:edge";
pub const DEFAULT_DATA_MOUNT: &str = "/data";

/// How the tool is started: a program plus the arguments that precede every
/// tool subcommand (for the container image this is the `docker run` prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolLauncher {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolLauncher {
    /// Runs the published image with the staging directory bind-mounted at
    /// `data_mount`.
    pub fn docker(staging_dir: &Path, data_mount: &str) -> Self {
        Self {
            program: "docker".to_string(),
            args: vec![
                "run".to_string(),
                "--rm".to_string(),
                "--mount".to_string(),
                format!(
                    "type=bind,src={},dst={}",
                    staging_dir.display(),
                    data_mount
                ),
                DEFAULT_TOOL_IMAGE.to_string(),
            ],
        }
    }

    pub fn direct(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }
}

/// Everything needed to build the four tool command shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    pub launcher: ToolLauncher,
    pub service_url: String,
    pub service_name: String,
    pub recordkeeper: String,
    pub data_mount: String,
}

impl ToolContext {
    pub fn upload_file(&self, file_name: &str) -> Result<ToolCommand, CommandError> {
        validate_file_name(file_name)?;
        let mut args = self.service_args("upload-file")?;
        args.push(format!(
            "{}/{}",
            self.data_mount.trim_end_matches('/'),
            file_name
        ));
        Ok(self.command(args))
    }

    pub fn create_proof_set(&self) -> Result<ToolCommand, CommandError> {
        validate_flag_value("recordkeeper", &self.recordkeeper)?;
        let mut args = self.service_args("create-proof-set")?;
        args.push("--recordkeeper".to_string());
        args.push(self.recordkeeper.clone());
        Ok(self.command(args))
    }

    pub fn proof_set_create_status(&self, tx_hash: &str) -> Result<ToolCommand, CommandError> {
        validate_flag_value("tx hash", tx_hash)?;
        let mut args = self.service_args("get-proof-set-create-status")?;
        args.push("--tx-hash".to_string());
        args.push(tx_hash.to_string());
        Ok(self.command(args))
    }

    pub fn add_roots(&self, proof_set_id: u64, root: &str) -> Result<ToolCommand, CommandError> {
        validate_flag_value("root", root)?;
        let mut args = self.service_args("add-roots")?;
        args.push(format!("--proof-set-id={proof_set_id}"));
        args.push("--root".to_string());
        args.push(root.to_string());
        Ok(self.command(args))
    }

    fn service_args(&self, subcommand: &str) -> Result<Vec<String>, CommandError> {
        validate_flag_value("service url", &self.service_url)?;
        validate_flag_value("service name", &self.service_name)?;
        Ok(vec![
            subcommand.to_string(),
            "--service-url".to_string(),
            self.service_url.clone(),
            "--service-name".to_string(),
            self.service_name.clone(),
        ])
    }

    fn command(&self, tool_args: Vec<String>) -> ToolCommand {
        let mut args = self.launcher.args.clone();
        args.extend(tool_args);
        ToolCommand {
            program: self.launcher.program.clone(),
            args,
        }
    }
}

fn invalid(name: &'static str, value: &str, reason: &str) -> CommandError {
    CommandError::InvalidArgument {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Values are passed as discrete argv entries, so quoting is never needed;
/// what remains is keeping them from being read as flags or breaking lines.
fn validate_flag_value(name: &'static str, value: &str) -> Result<(), CommandError> {
    if value.trim().is_empty() {
        return Err(invalid(name, value, "must be non-empty"));
    }
    if value.starts_with('-') {
        return Err(invalid(name, value, "must not start with '-'"));
    }
    if value.chars().any(char::is_control) {
        return Err(invalid(name, value, "must not contain control characters"));
    }
    Ok(())
}

fn validate_file_name(file_name: &str) -> Result<(), CommandError> {
    validate_flag_value("file name", file_name)?;
    if file_name == "." || file_name == ".." {
        return Err(invalid("file name", file_name, "must name a file"));
    }
    if file_name.contains('/') || file_name.contains('\\') {
        return Err(invalid(
            "file name",
            file_name,
            "must not contain path separators",
        ));
    }
    Ok(())
}

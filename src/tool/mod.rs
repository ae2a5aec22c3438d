//! Invocation surface of the external proving tool (`pdptool`).
//!
//! Commands are built as argv vectors, executed by a [`CommandRunner`] and
//! their unstructured output is scanned by the parsers in [`output_parse`].

pub mod invocation;
pub mod output_parse;
pub mod runner;

pub use invocation::{ToolContext, ToolLauncher};
pub use output_parse::{parse_confirmation_ref, parse_content_id, parse_proof_set_id};
pub use runner::{CommandRunner, ProcessRunner};

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("tool binary missing: {program}")]
    MissingBinary { program: String },
    #[error("failed to launch `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("command `{command_form}` timed out after {timeout_ms}ms")]
    Timeout { command_form: String, timeout_ms: u64 },
    #[error("invalid {name} `{value}`: {reason}")]
    InvalidArgument {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// A fully resolved command: the program and its arguments, never a shell line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Human readable rendering for logs. Not meant to be fed to a shell.
    pub fn command_form(&self) -> String {
        if self.args.is_empty() {
            return self.program.clone();
        }
        format!("{} {}", self.program, self.args.join(" "))
    }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombinedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CombinedOutput {
    /// Standard output followed by standard error.
    pub fn text(&self) -> String {
        let mut text = String::with_capacity(self.stdout.len() + self.stderr.len());
        text.push_str(&self.stdout);
        text.push_str(&self.stderr);
        text
    }

    pub fn exited_successfully(&self) -> bool {
        self.exit_code == Some(0)
    }
}

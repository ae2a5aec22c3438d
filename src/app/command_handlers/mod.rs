use crate::app::cli::{help_text, parse_cli_verb, take_option, CliVerb};
use crate::app::command_support::CliContext;
use std::path::PathBuf;

pub mod monitor;
pub mod proof_status;
pub mod workflows;

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let mut args = args;
    let ctx = CliContext {
        config: take_option(&mut args, "config")?.map(PathBuf::from),
    };
    if args.is_empty() {
        return Ok(help_text());
    }

    match parse_cli_verb(args[0].as_str()) {
        CliVerb::Run => workflows::cmd_run(&ctx, &args[1..]),
        CliVerb::State => workflows::cmd_state(&ctx, &args[1..]),
        CliVerb::Reset => workflows::cmd_reset(&ctx, &args[1..]),
        CliVerb::List => workflows::cmd_list(&ctx, &args[1..]),
        CliVerb::ProofStatus => proof_status::cmd_proof_status(&ctx, &args[1..]),
        CliVerb::Monitor => monitor::cmd_monitor(&ctx, &args[1..]),
        CliVerb::Help => Ok(help_text()),
        CliVerb::Unknown => Err(format!("unknown command `{}`", args[0])),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Run,
    State,
    Reset,
    List,
    ProofStatus,
    Monitor,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "run" => CliVerb::Run,
        "state" => CliVerb::State,
        "reset" => CliVerb::Reset,
        "list" => CliVerb::List,
        "proof-status" => CliVerb::ProofStatus,
        "monitor" => CliVerb::Monitor,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  run <file>                           Upload a file and register it in a proof set"
            .to_string(),
        "  state <file>                         Print the persisted workflow record".to_string(),
        "  reset <file>                         Forget the workflow record for a file".to_string(),
        "  list                                 List known workflows and their stage".to_string(),
        "  proof-status <file>                  Ask the explorer whether the root is proven"
            .to_string(),
        "  monitor [--bind <addr>]              Receive stage events and print file status"
            .to_string(),
        "  help                                 Show this help".to_string(),
        String::new(),
        "Options:".to_string(),
        "  --config <path>                      Settings file (default ~/.pdpflow/config.yaml)"
            .to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

/// Removes `--name <value>` (or `--name=value`) from `args`.
pub fn take_option(args: &mut Vec<String>, name: &str) -> Result<Option<String>, String> {
    let flag = format!("--{name}");
    let prefix = format!("{flag}=");
    let Some(index) = args
        .iter()
        .position(|arg| arg == &flag || arg.starts_with(&prefix))
    else {
        return Ok(None);
    };

    let arg = args.remove(index);
    if let Some(value) = arg.strip_prefix(&prefix) {
        if value.is_empty() {
            return Err(format!("{flag} requires a value"));
        }
        return Ok(Some(value.to_string()));
    }
    if index >= args.len() || args[index].starts_with("--") {
        return Err(format!("{flag} requires a value"));
    }
    Ok(Some(args.remove(index)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn take_option_supports_both_forms() {
        let mut args = strings(&["run", "--config", "a.yaml", "cat.jpg"]);
        assert_eq!(
            take_option(&mut args, "config").expect("parse"),
            Some("a.yaml".to_string())
        );
        assert_eq!(args, strings(&["run", "cat.jpg"]));

        let mut args = strings(&["monitor", "--bind=0.0.0.0:5555"]);
        assert_eq!(
            take_option(&mut args, "bind").expect("parse"),
            Some("0.0.0.0:5555".to_string())
        );
        assert_eq!(args, strings(&["monitor"]));
    }

    #[test]
    fn take_option_requires_value() {
        let mut args = strings(&["run", "cat.jpg", "--config"]);
        assert!(take_option(&mut args, "config").is_err());
        let mut args = strings(&["run", "--config", "--bind", "x"]);
        assert!(take_option(&mut args, "config").is_err());
    }

    #[test]
    fn help_lists_every_verb() {
        let help = help_text();
        for verb in ["run", "state", "reset", "list", "proof-status", "monitor"] {
            assert!(help.contains(&format!("  {verb}")), "missing {verb}");
            assert_ne!(parse_cli_verb(verb), CliVerb::Unknown);
        }
    }
}

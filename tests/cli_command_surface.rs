use pdpflow::app::command_handlers::run_cli;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

const TX_HASH: &str = "0x00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

struct Env {
    dir: TempDir,
    config: PathBuf,
    input: PathBuf,
}

fn env_with_tool(upload_output: &str) -> Env {
    let dir = tempdir().expect("tempdir");
    let tool = dir.path().join("pdptool-mock");
    write_script(
        &tool,
        &format!(
            "#!/bin/sh\ncase \"$1\" in\n  upload-file) echo '{upload_output}' ;;\n  create-proof-set) echo 'submitted {TX_HASH}' ;;\n  get-proof-set-create-status) echo 'ProofSet ID: 7' ;;\n  add-roots) echo 'roots added' ;;\n  *) exit 2 ;;\nesac\n"
        ),
    );

    let config = dir.path().join("pdpflow.yaml");
    fs::write(
        &config,
        format!(
            r#"
service_url: https://sp.example
service_name: pdp-client
recordkeeper: "0x6170dE2b09b404776197485F3dc6c968Ef948505"
staging_dir: {staging}
state_root: {state}
tool:
  launcher:
    program: {tool}
polling:
  interval_secs: 1
  max_interval_secs: 1
  max_attempts: 3
"#,
            staging = dir.path().join("pdp-data").display(),
            state = dir.path().join("state").display(),
            tool = tool.display(),
        ),
    )
    .expect("write config");

    let input = dir.path().join("cat.jpg");
    fs::write(&input, b"meow").expect("write input");
    Env { dir, config, input }
}

fn cli(env: &Env, args: &[&str]) -> Result<String, String> {
    let mut argv: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    argv.push("--config".to_string());
    argv.push(env.config.display().to_string());
    run_cli(argv)
}

#[test]
fn run_state_list_and_reset_flow() {
    let env = env_with_tool("Uploaded baga6ea4seaqcontent:baga6ea4seaqroot");
    let input = env.input.display().to_string();

    let output = cli(&env, &["run", &input]).expect("run");
    assert!(output.contains("completed: proof set 7"), "{output}");
    assert!(output.contains("content_id=baga6ea4seaqcontent:baga6ea4seaqroot"));
    assert!(env.dir.path().join("pdp-data/cat.jpg").is_file());

    let state = cli(&env, &["state", &input]).expect("state");
    assert!(state.contains("stage=completed"), "{state}");
    assert!(state.contains("proof_set_id=7"));
    assert!(state.contains(&format!("confirmation_ref={TX_HASH}")));
    assert!(state.contains("roots_added=true"));

    let list = cli(&env, &["list"]).expect("list");
    assert_eq!(list.lines().count(), 1);
    assert!(list.contains("stage=completed file=cat.jpg"), "{list}");

    let again = cli(&env, &["run", &input]).expect("second run");
    assert!(again.contains("completed"));

    let reset = cli(&env, &["reset", &input]).expect("reset");
    assert!(reset.starts_with("reset workflow cat_jpg-"), "{reset}");
    let state = cli(&env, &["state", &input]).expect("state after reset");
    assert!(state.starts_with("no workflow state"), "{state}");
}

#[test]
fn failed_run_is_an_error_with_reason() {
    let env = env_with_tool("upload finished");
    let input = env.input.display().to_string();

    let err = cli(&env, &["run", &input]).expect_err("must fail");
    assert!(err.contains("failed: upload: no identifier found"), "{err}");

    let state = cli(&env, &["state", &input]).expect("state");
    assert!(state.contains("stage=failed"));
    assert!(state.contains("content_id=-"));
}

#[test]
fn proof_status_requires_added_roots() {
    let env = env_with_tool("upload finished");
    let input = env.input.display().to_string();
    let err = cli(&env, &["proof-status", &input]).expect_err("no proof set");
    assert!(err.contains("has no proof set yet"), "{err}");
}

#[test]
fn argument_errors_are_reported() {
    let env = env_with_tool("unused");
    assert!(cli(&env, &["run"]).expect_err("usage").starts_with("usage: run"));
    assert!(cli(&env, &["run", "/definitely/missing.bin"])
        .expect_err("missing")
        .contains("does not exist"));
    assert_eq!(
        cli(&env, &["frobnicate"]).expect_err("unknown"),
        "unknown command `frobnicate`"
    );
    assert!(run_cli(vec!["run".to_string(), "--config".to_string()])
        .expect_err("flag value")
        .contains("--config requires a value"));
    assert!(cli(&env, &["list", "extra"]).is_err());
}

#[test]
fn help_is_default_output() {
    let help = run_cli(Vec::new()).expect("help");
    assert!(help.starts_with("Commands:"));
    assert!(help.contains("proof-status <file>"));
    assert_eq!(run_cli(vec!["help".to_string()]).expect("help verb"), help);
}

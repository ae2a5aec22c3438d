use pdpflow::tool::{CommandError, CommandRunner, ProcessRunner, ToolContext, ToolLauncher};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

fn write_script(path: &Path, body: &str) {
    fs::write(path, body).expect("write script");
    let mut perms = fs::metadata(path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn context(program: &Path) -> ToolContext {
    ToolContext {
        launcher: ToolLauncher::direct(program.display().to_string()),
        service_url: "https://sp.example".to_string(),
        service_name: "pdp-client".to_string(),
        recordkeeper: "0xabc".to_string(),
        data_mount: "/data".to_string(),
    }
}

#[test]
fn captures_stdout_and_stderr_of_mock_tool() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("pdptool-mock");
    write_script(
        &bin,
        "#!/bin/sh\necho \"args: $*\"\necho 'warning: slow provider' >&2\n",
    );

    let command = context(&bin).upload_file("cat.jpg").expect("command");
    let output = ProcessRunner::new().run(&command).expect("run");

    assert!(output.exited_successfully());
    assert_eq!(
        output.stdout,
        "args: upload-file --service-url https://sp.example --service-name pdp-client /data/cat.jpg\n"
    );
    assert_eq!(output.stderr, "warning: slow provider\n");
    assert!(output.text().ends_with("warning: slow provider\n"));
}

#[test]
fn nonzero_exit_is_reported_not_raised() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("pdptool-fail");
    write_script(&bin, "#!/bin/sh\necho 'add-roots failed' >&2\nexit 3\n");

    let command = context(&bin).add_roots(7, "bagaA:bagaB").expect("command");
    let output = ProcessRunner::new().run(&command).expect("run");
    assert_eq!(output.exit_code, Some(3));
    assert!(!output.exited_successfully());
    assert!(output.stderr.contains("add-roots failed"));
}

#[test]
fn shell_metacharacters_are_passed_literally() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("pdptool-echo");
    let marker = dir.path().join("pwned");
    write_script(&bin, "#!/bin/sh\nfor a in \"$@\"; do echo \"[$a]\"; done\n");

    let mut tool = context(&bin);
    tool.service_name = format!("svc;touch {}", marker.display());
    let output = ProcessRunner::new()
        .run(&tool.create_proof_set().expect("command"))
        .expect("run");

    assert!(output.stdout.contains(&format!("[svc;touch {}]", marker.display())));
    assert!(!marker.exists());
}

#[test]
fn missing_binary_is_reported() {
    let dir = tempdir().expect("tempdir");
    let command = context(&dir.path().join("does-not-exist"))
        .create_proof_set()
        .expect("command");
    let err = ProcessRunner::new().run(&command).expect_err("missing");
    assert!(matches!(err, CommandError::MissingBinary { .. }));
}

#[test]
fn slow_tool_times_out() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("pdptool-slow");
    write_script(&bin, "#!/bin/sh\nexec sleep 5\n");

    let command = context(&bin)
        .proof_set_create_status("0xabc")
        .expect("command");
    let err = ProcessRunner::new()
        .with_timeout(Duration::from_millis(100))
        .run(&command)
        .expect_err("timeout");
    assert!(matches!(err, CommandError::Timeout { timeout_ms: 100, .. }));
}

#[test]
fn runs_in_configured_working_directory() {
    let dir = tempdir().expect("tempdir");
    let bin = dir.path().join("pdptool-pwd");
    write_script(&bin, "#!/bin/sh\npwd\n");
    let work = dir.path().join("work");
    fs::create_dir_all(&work).expect("work dir");

    let command = context(&bin).create_proof_set().expect("command");
    let output = ProcessRunner::new()
        .with_cwd(&work)
        .run(&command)
        .expect("run");
    let printed = fs::canonicalize(output.stdout.trim()).expect("canonical pwd");
    assert_eq!(printed, fs::canonicalize(&work).expect("canonical work"));
}

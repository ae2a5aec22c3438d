use crate::tool::{CombinedOutput, CommandError, ToolCommand};
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Executes tool commands. Implementations report the exit status in the
/// returned output and only error when the process cannot run at all.
pub trait CommandRunner {
    fn run(&self, command: &ToolCommand) -> Result<CombinedOutput, CommandError>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &ToolCommand) -> Result<CombinedOutput, CommandError> {
        (**self).run(command)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for Box<T> {
    fn run(&self, command: &ToolCommand) -> Result<CombinedOutput, CommandError> {
        (**self).run(command)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &ToolCommand) -> Result<CombinedOutput, CommandError> {
        let mut process = Command::new(&command.program);
        process
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &self.cwd {
            process.current_dir(cwd);
        }

        let launch_error = |source: std::io::Error| CommandError::Launch {
            program: command.program.clone(),
            source,
        };

        let mut child = match process.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(CommandError::MissingBinary {
                    program: command.program.clone(),
                })
            }
            Err(err) => return Err(launch_error(err)),
        };

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("missing stdout pipe")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| launch_error(std::io::Error::other("missing stderr pipe")))?;

        let stdout_reader = thread::spawn(move || read_lossy(stdout));
        let stderr_reader = thread::spawn(move || read_lossy(stderr));

        let start = Instant::now();
        let exit_status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if let Some(timeout) = self.timeout {
                        if start.elapsed() > timeout {
                            let _ = child.kill();
                            let _ = child.wait();
                            let _ = stdout_reader.join();
                            let _ = stderr_reader.join();
                            return Err(CommandError::Timeout {
                                command_form: command.command_form(),
                                timeout_ms: timeout.as_millis() as u64,
                            });
                        }
                    }
                    thread::sleep(Duration::from_millis(10));
                }
                Err(err) => return Err(launch_error(err)),
            }
        };

        Ok(CombinedOutput {
            stdout: stdout_reader.join().unwrap_or_default(),
            stderr: stderr_reader.join().unwrap_or_default(),
            exit_code: exit_status.code(),
        })
    }
}

fn read_lossy(stream: impl Read) -> String {
    let mut bytes = Vec::new();
    let mut reader = BufReader::new(stream);
    let _ = reader.read_to_end(&mut bytes);
    String::from_utf8_lossy(&bytes).into_owned()
}

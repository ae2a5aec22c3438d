use crate::orchestration::error::WorkflowError;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const LOCK_FILE_NAME: &str = "workflow.lock";
const RECLAIM_ATTEMPTS: usize = 4;

/// Exclusive claim on one workflow key, released on drop.
///
/// The lock file holds the owner's pid on its first line and a per-claim
/// token on the second. A lock whose owner is no longer alive is stale and
/// may be reclaimed.
#[derive(Debug)]
pub struct WorkflowLock {
    path: PathBuf,
    token: String,
}

/// What happened to a lock file moved aside for reclaiming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reclaim {
    /// The moved file was stale and is gone.
    Removed,
    /// Another claimant already removed it.
    Vanished,
    /// The moved file belonged to a live owner and was put back.
    Restored { pid: u32 },
}

impl WorkflowLock {
    pub fn acquire(workflow_dir: &Path, key: &str) -> Result<Self, WorkflowError> {
        fs::create_dir_all(workflow_dir).map_err(|source| WorkflowError::Lock {
            path: workflow_dir.display().to_string(),
            source,
        })?;
        let path = workflow_dir.join(LOCK_FILE_NAME);
        let token = claim_token();
        let lock_error = |source: std::io::Error| WorkflowError::Lock {
            path: path.display().to_string(),
            source,
        };

        for _ in 0..RECLAIM_ATTEMPTS {
            match try_create(&path, &token) {
                Ok(()) => return Ok(Self { path, token }),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(source) => return Err(lock_error(source)),
            }

            if let Some(pid) = read_lock_pid(&path)?.filter(|pid| is_process_alive(*pid)) {
                return Err(WorkflowError::Locked {
                    key: key.to_string(),
                    pid,
                });
            }
            match reclaim(&path).map_err(lock_error)? {
                Reclaim::Removed | Reclaim::Vanished => {}
                Reclaim::Restored { pid } => {
                    return Err(WorkflowError::Locked {
                        key: key.to_string(),
                        pid,
                    })
                }
            }
        }

        Err(lock_error(std::io::Error::other(
            "lock kept reappearing while reclaiming a stale lock",
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WorkflowLock {
    fn drop(&mut self) {
        let still_ours = fs::read_to_string(&self.path)
            .map(|raw| raw.lines().nth(1) == Some(self.token.as_str()))
            .unwrap_or(false);
        if still_ours {
            let _ = fs::remove_file(&self.path);
        }
    }
}

fn claim_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let sequence = CLAIM_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos:x}-{sequence}", std::process::id())
}

static CLAIM_SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn try_create(path: &Path, token: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(path)?;
    file.write_all(format!("{}\n{token}\n", std::process::id()).as_bytes())
}

/// Moves the lock file aside under a unique name, so only one claimant acts
/// on whatever file was there. The moved file is deleted if its owner is
/// gone; a live owner's file is linked back into place.
pub(crate) fn reclaim(path: &Path) -> std::io::Result<Reclaim> {
    let aside = path.with_extension(format!("stale-{}", claim_token()));
    match fs::rename(path, &aside) {
        Ok(()) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Reclaim::Vanished),
        Err(err) => return Err(err),
    }

    let owner = fs::read_to_string(&aside)
        .ok()
        .and_then(|raw| parse_lock_pid(&raw))
        .filter(|pid| is_process_alive(*pid));
    let outcome = match owner {
        None => Reclaim::Removed,
        Some(pid) => match fs::hard_link(&aside, path) {
            Ok(()) => Reclaim::Restored { pid },
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Reclaim::Restored { pid },
            Err(err) => {
                let _ = fs::rename(&aside, path);
                return Err(err);
            }
        },
    };
    fs::remove_file(&aside)?;
    Ok(outcome)
}

fn parse_lock_pid(raw: &str) -> Option<u32> {
    raw.lines().next()?.trim().parse::<u32>().ok()
}

fn read_lock_pid(path: &Path) -> Result<Option<u32>, WorkflowError> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(parse_lock_pid(&raw)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(WorkflowError::Lock {
            path: path.display().to_string(),
            source,
        }),
    }
}

pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    if pid == std::process::id() {
        return true;
    }

    #[cfg(unix)]
    {
        std::process::Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    {
        true
    }
}

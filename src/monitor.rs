//! Subscriber side of the stage-event boundary.
//!
//! Accepts WebSocket connections, acknowledges every message, tracks the most
//! recent file and writes `file,status` lines to a sink. While the latest
//! file has its roots added, the explorer is polled for proof status.

use crate::explorer::{classify_root_status, root_cid_of, ExplorerClient, StorageStatus};
use crate::orchestration::events::{StageEvent, STAGE_ROOTS_ADDED, STAGE_UPLOADED};
use crate::orchestration::polling::CancellationToken;
use crate::shared::logging::append_workflow_log;
use std::io::{ErrorKind, Write};
use std::net::{TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, WebSocket};

pub const ACK_PAYLOAD: &str = "ACK";
const ACCEPT_IDLE_SLEEP: Duration = Duration::from_millis(40);
/// A connected peer that sends nothing for this long is dropped.
pub const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("failed to bind monitor on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("monitor socket error: {0}")]
    Socket(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub file: String,
    pub status: String,
}

impl StatusLine {
    pub fn render(&self) -> String {
        format!("{},{}", self.file, self.status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct TrackedFile {
    stage: String,
    file: String,
    file_id: String,
    proof_set_id: Option<u64>,
}

/// Latest file seen on the event stream and the last status emitted for it.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    current: Option<TrackedFile>,
    last_status: Option<String>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies an event. Returns a line when the stage or file changed.
    pub fn observe(&mut self, event: &StageEvent) -> Option<StatusLine> {
        let status = match event.stage.as_str() {
            STAGE_UPLOADED => StorageStatus::Uploaded,
            STAGE_ROOTS_ADDED => StorageStatus::Stored,
            _ => return None,
        };
        let file = event.data.get("file")?.clone();
        let tracked = TrackedFile {
            stage: event.stage.clone(),
            file: file.clone(),
            file_id: event.data.get("file_id").cloned().unwrap_or_default(),
            proof_set_id: event
                .data
                .get("proofset_id")
                .and_then(|raw| raw.trim().parse::<u64>().ok()),
        };

        let changed = match &self.current {
            None => true,
            Some(current) => current.stage != tracked.stage || current.file != tracked.file,
        };
        if !changed {
            return None;
        }

        self.current = Some(tracked);
        self.last_status = Some(status.as_str().to_string());
        Some(StatusLine {
            file,
            status: status.as_str().to_string(),
        })
    }

    /// `(proof_set_id, root_cid)` to check while the latest file is stored.
    pub fn storage_check_target(&self) -> Option<(u64, String)> {
        let current = self.current.as_ref()?;
        if current.stage != STAGE_ROOTS_ADDED {
            return None;
        }
        let proof_set_id = current.proof_set_id?;
        let root_cid = root_cid_of(&current.file_id)?;
        Some((proof_set_id, root_cid.to_string()))
    }

    /// Records an explorer result. Returns a line only when the status moved.
    pub fn refresh(&mut self, status: StorageStatus) -> Option<StatusLine> {
        let current = self.current.as_ref()?;
        if current.stage != STAGE_ROOTS_ADDED {
            return None;
        }
        if self.last_status.as_deref() == Some(status.as_str()) {
            return None;
        }
        self.last_status = Some(status.as_str().to_string());
        Some(StatusLine {
            file: current.file.clone(),
            status: status.as_str().to_string(),
        })
    }
}

pub trait StatusSink {
    fn emit(&self, line: &StatusLine);
}

/// Writes rendered lines to any writer (stdout, a device file, a buffer).
pub struct WriterSink<W: Write> {
    writer: Mutex<W>,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write> StatusSink for WriterSink<W> {
    fn emit(&self, line: &StatusLine) {
        let mut writer = match self.writer.lock() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        };
        let _ = writeln!(writer, "{}", line.render());
        let _ = writer.flush();
    }
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub state_root: PathBuf,
    pub explorer: Option<ExplorerClient>,
    pub check_interval: Duration,
}

fn lock_tracker(tracker: &Mutex<StatusTracker>) -> std::sync::MutexGuard<'_, StatusTracker> {
    match tracker.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Serves one subscriber connection until the publisher closes it.
/// Returns how many events were acknowledged.
pub fn serve_connection<S: std::io::Read + Write>(
    socket: &mut WebSocket<S>,
    tracker: &Mutex<StatusTracker>,
    sink: &dyn StatusSink,
    options: &MonitorOptions,
) -> Result<usize, MonitorError> {
    let mut acknowledged = 0usize;
    loop {
        let text = match socket.read() {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Ping(payload)) => {
                let _ = socket.send(Message::Pong(payload));
                continue;
            }
            Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
            Ok(Message::Close(_)) => break,
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                break
            }
            Err(err) => return Err(MonitorError::Socket(err.to_string())),
        };

        match serde_json::from_str::<StageEvent>(&text) {
            Ok(event) => {
                append_workflow_log(
                    &options.state_root,
                    "info",
                    "monitor.event",
                    &format!(
                        "stage={} file={}",
                        event.stage,
                        event.data.get("file").map(String::as_str).unwrap_or("-")
                    ),
                );
                let line = lock_tracker(tracker).observe(&event);
                if let Some(line) = line {
                    sink.emit(&line);
                }
            }
            Err(err) => append_workflow_log(
                &options.state_root,
                "warn",
                "monitor.event.invalid",
                &format!("{err}: {text}"),
            ),
        }

        socket
            .send(Message::Text(ACK_PAYLOAD.to_string()))
            .map_err(|err| MonitorError::Socket(err.to_string()))?;
        acknowledged += 1;
    }
    Ok(acknowledged)
}

fn check_storage(
    tracker: &Mutex<StatusTracker>,
    sink: &dyn StatusSink,
    explorer: &ExplorerClient,
    options: &MonitorOptions,
) {
    let Some((proof_set_id, root_cid)) = lock_tracker(tracker).storage_check_target() else {
        return;
    };
    let status = explorer
        .fetch_roots(proof_set_id)
        .map(|roots| classify_root_status(&roots.data, &root_cid));
    match status {
        Ok(Some(status)) => {
            let line = lock_tracker(tracker).refresh(status);
            if let Some(line) = line {
                sink.emit(&line);
            }
        }
        Ok(None) => append_workflow_log(
            &options.state_root,
            "warn",
            "monitor.explorer.missing_root",
            &format!("proof_set_id={proof_set_id} root={root_cid}"),
        ),
        Err(err) => append_workflow_log(
            &options.state_root,
            "error",
            "monitor.explorer.failed",
            &err.to_string(),
        ),
    }
}

/// Accepts publishers on `listener` until `stop` is cancelled.
pub fn run_monitor(
    listener: TcpListener,
    sink: Arc<dyn StatusSink + Send + Sync>,
    options: MonitorOptions,
    stop: CancellationToken,
) -> Result<(), MonitorError> {
    listener
        .set_nonblocking(true)
        .map_err(|err| MonitorError::Socket(err.to_string()))?;
    let tracker = Arc::new(Mutex::new(StatusTracker::new()));

    let checker = options.explorer.clone().map(|explorer| {
        let tracker = Arc::clone(&tracker);
        let sink = Arc::clone(&sink);
        let stop = stop.clone();
        let options = options.clone();
        thread::spawn(move || {
            while stop.sleep(options.check_interval) {
                check_storage(&tracker, sink.as_ref(), &explorer, &options);
            }
        })
    });

    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    let accepted = loop {
        if stop.is_cancelled() {
            break Ok(());
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                connections.retain(|handle| !handle.is_finished());
                let tracker = Arc::clone(&tracker);
                let sink = Arc::clone(&sink);
                let options = options.clone();
                let spawned = thread::Builder::new()
                    .name("pdpflow-monitor-conn".to_string())
                    .spawn(move || {
                        if let Err(err) = handle_stream(stream, &tracker, sink.as_ref(), &options)
                        {
                            append_workflow_log(
                                &options.state_root,
                                "warn",
                                "monitor.connection.failed",
                                &format!("peer={peer} {err}"),
                            );
                        }
                    });
                match spawned {
                    Ok(handle) => connections.push(handle),
                    Err(err) => break Err(MonitorError::Socket(err.to_string())),
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_IDLE_SLEEP),
            Err(err) => break Err(MonitorError::Socket(err.to_string())),
        }
    };

    stop.cancel();
    for handle in connections {
        let _ = handle.join();
    }
    if let Some(checker) = checker {
        let _ = checker.join();
    }
    accepted
}

fn handle_stream(
    stream: TcpStream,
    tracker: &Mutex<StatusTracker>,
    sink: &dyn StatusSink,
    options: &MonitorOptions,
) -> Result<usize, MonitorError> {
    stream
        .set_nonblocking(false)
        .and_then(|()| stream.set_read_timeout(Some(CONNECTION_READ_TIMEOUT)))
        .map_err(|err| MonitorError::Socket(err.to_string()))?;
    let mut socket =
        tungstenite::accept(stream).map_err(|err| MonitorError::Socket(err.to_string()))?;
    serve_connection(&mut socket, tracker, sink, options)
}

pub fn bind_monitor(addr: &str) -> Result<TcpListener, MonitorError> {
    TcpListener::bind(addr).map_err(|source| MonitorError::Bind {
        addr: addr.to_string(),
        source,
    })
}

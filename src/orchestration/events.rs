use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::HandshakeError;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{client_tls, Message, WebSocket};

pub const STAGE_UPLOADED: &str = "Uploaded";
pub const STAGE_ROOTS_ADDED: &str = "RootsAdded";

/// Stage-transition notification: `{"stage": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageEvent {
    pub stage: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl StageEvent {
    pub fn uploaded(file: &str, file_id: &str) -> Self {
        Self {
            stage: STAGE_UPLOADED.to_string(),
            data: BTreeMap::from([
                ("file".to_string(), file.to_string()),
                ("file_id".to_string(), file_id.to_string()),
            ]),
        }
    }

    pub fn roots_added(file: &str, file_id: &str, proof_set_id: u64) -> Self {
        Self {
            stage: STAGE_ROOTS_ADDED.to_string(),
            data: BTreeMap::from([
                ("file".to_string(), file.to_string()),
                ("file_id".to_string(), file_id.to_string()),
                ("proofset_id".to_string(), proof_set_id.to_string()),
            ]),
        }
    }

    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(self).map_err(PublishError::Encode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode stage event: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    #[error("failed to send stage event: {0}")]
    Send(String),
    #[error("no acknowledgment within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("subscriber closed the connection before acknowledging")]
    Closed,
}

/// Notification port: delivers one event and blocks until the subscriber
/// acknowledges it.
pub trait EventPublisher {
    fn publish(&self, event: &StageEvent) -> Result<Acknowledgment, PublishError>;
}

impl<T: EventPublisher + ?Sized> EventPublisher for &T {
    fn publish(&self, event: &StageEvent) -> Result<Acknowledgment, PublishError> {
        (**self).publish(event)
    }
}

impl<T: EventPublisher + ?Sized> EventPublisher for Box<T> {
    fn publish(&self, event: &StageEvent) -> Result<Acknowledgment, PublishError> {
        (**self).publish(event)
    }
}

/// Used when no subscriber is configured; acknowledges locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

impl EventPublisher for NoopPublisher {
    fn publish(&self, _event: &StageEvent) -> Result<Acknowledgment, PublishError> {
        Ok(Acknowledgment {
            payload: "local".to_string(),
        })
    }
}

/// Request/acknowledge exchange over a WebSocket: one connection per event,
/// one text frame out, the first data frame back is the acknowledgment.
#[derive(Debug, Clone)]
pub struct WebSocketPublisher {
    endpoint: String,
    ack_timeout: Duration,
}

impl WebSocketPublisher {
    pub fn new(endpoint: impl Into<String>, ack_timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            ack_timeout,
        }
    }

    fn timeout(&self) -> PublishError {
        PublishError::Timeout {
            timeout_ms: self.ack_timeout.as_millis() as u64,
        }
    }

    fn remaining(&self, deadline: Instant) -> Result<Duration, PublishError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(self.timeout());
        }
        Ok(remaining)
    }

    fn connect_error(&self, reason: impl ToString) -> PublishError {
        PublishError::Connect {
            endpoint: self.endpoint.clone(),
            reason: reason.to_string(),
        }
    }

    /// Opens the TCP connection and runs the WebSocket handshake, both
    /// bounded by `deadline`.
    fn open(
        &self,
        deadline: Instant,
    ) -> Result<WebSocket<MaybeTlsStream<TcpStream>>, PublishError> {
        let request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|err| self.connect_error(err))?;
        let uri = request.uri();
        let host = uri
            .host()
            .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_string())
            .ok_or_else(|| self.connect_error("endpoint has no host"))?;
        let port = uri
            .port_u16()
            .unwrap_or(if uri.scheme_str() == Some("wss") { 443 } else { 80 });

        let addrs = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|err| self.connect_error(err))?;
        let mut last_error = None;
        let mut stream = None;
        for addr in addrs {
            let remaining = self.remaining(deadline)?;
            match TcpStream::connect_timeout(&addr, remaining) {
                Ok(connected) => {
                    stream = Some(connected);
                    break;
                }
                Err(err) => last_error = Some(err),
            }
        }
        let stream = match (stream, last_error) {
            (Some(stream), _) => stream,
            (None, Some(err)) if is_timeout(&err) => return Err(self.timeout()),
            (None, Some(err)) => return Err(self.connect_error(err)),
            (None, None) => return Err(self.connect_error("endpoint resolved to no address")),
        };

        let remaining = self.remaining(deadline)?;
        stream
            .set_read_timeout(Some(remaining))
            .and_then(|()| stream.set_write_timeout(Some(remaining)))
            .map_err(|err| self.connect_error(err))?;

        match client_tls(request, stream) {
            Ok((socket, _response)) => Ok(socket),
            Err(HandshakeError::Interrupted(_)) => Err(self.timeout()),
            Err(HandshakeError::Failure(tungstenite::Error::Io(err))) if is_timeout(&err) => {
                Err(self.timeout())
            }
            Err(HandshakeError::Failure(err)) => Err(self.connect_error(err)),
        }
    }

    fn await_ack(
        &self,
        socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
        deadline: Instant,
    ) -> Result<Acknowledgment, PublishError> {
        loop {
            let remaining = self.remaining(deadline)?;
            set_read_timeout(socket, remaining);

            match socket.read() {
                Ok(Message::Text(text)) => return Ok(Acknowledgment { payload: text }),
                Ok(Message::Binary(bytes)) => {
                    return Ok(Acknowledgment {
                        payload: String::from_utf8_lossy(&bytes).into_owned(),
                    })
                }
                Ok(Message::Ping(payload)) => {
                    let _ = socket.send(Message::Pong(payload));
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) | Err(tungstenite::Error::ConnectionClosed) => {
                    return Err(PublishError::Closed)
                }
                Err(tungstenite::Error::Io(err)) if is_timeout(&err) => {
                    if Instant::now() >= deadline {
                        return Err(self.timeout());
                    }
                }
                Err(err) => return Err(PublishError::Send(err.to_string())),
            }
        }
    }
}

impl EventPublisher for WebSocketPublisher {
    fn publish(&self, event: &StageEvent) -> Result<Acknowledgment, PublishError> {
        let body = event.to_json()?;
        let deadline = Instant::now() + self.ack_timeout;
        let mut socket = self.open(deadline)?;

        match socket.send(Message::Text(body)) {
            Ok(()) => {}
            Err(tungstenite::Error::Io(err)) if is_timeout(&err) => return Err(self.timeout()),
            Err(err) => return Err(PublishError::Send(err.to_string())),
        }
        let ack = self.await_ack(&mut socket, deadline);
        let _ = socket.close(None);
        ack
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn set_read_timeout(socket: &mut WebSocket<MaybeTlsStream<TcpStream>>, timeout: Duration) {
    let timeout = Some(timeout.max(Duration::from_millis(1)));
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => {
            let _ = stream.set_read_timeout(timeout);
        }
        MaybeTlsStream::Rustls(stream) => {
            let _ = stream.get_ref().set_read_timeout(timeout);
        }
        _ => {}
    }
}

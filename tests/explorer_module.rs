use pdpflow::explorer::{ExplorerClient, ExplorerError, StorageStatus};
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread::{self, JoinHandle};

/// Serves a single HTTP response and returns the request line it saw.
fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut request_line = String::new();
        reader.read_line(&mut request_line).expect("request line");
        loop {
            let mut header = String::new();
            reader.read_line(&mut header).expect("header");
            if header == "\r\n" || header.is_empty() {
                break;
            }
        }
        stream.write_all(response.as_bytes()).expect("respond");
        request_line
    });
    (base, handle)
}

const ROOTS: &str = r#"{
  "data": [
    {"rootId": 1, "cid": "bagaOther", "size": 10, "removed": false,
     "totalPeriodsFaulted": 0, "totalProofsSubmitted": 0,
     "lastProvenEpoch": 0, "lastFaultedEpoch": 0, "createdAt": "2025-01-01T00:00:00Z"},
    {"rootId": 2, "cid": "bagaB", "size": 2048, "removed": false,
     "totalPeriodsFaulted": 1, "totalProofsSubmitted": 3,
     "lastProvenEpoch": 90, "lastProvenAt": "2025-01-02T00:00:00Z",
     "lastFaultedEpoch": 120, "lastFaultedAt": "2025-01-03T00:00:00Z",
     "createdAt": "2025-01-01T00:00:00Z"}
  ],
  "metadata": {"total": 2, "offset": 0, "limit": 100}
}"#;

#[test]
fn root_status_queries_proof_set_roots() {
    let (base, server) = serve_once("200 OK", ROOTS);
    let client = ExplorerClient::new(base, 100);

    let status = client.root_status(51, "bagaA:bagaB").expect("status");
    assert_eq!(status, Some(StorageStatus::StoredAndFaulty));

    let request_line = server.join().expect("server");
    assert!(request_line.starts_with("GET /api/proofsets/51/roots?orderBy=root_id&limit=100 "));
}

#[test]
fn unlisted_root_is_none() {
    let (base, server) = serve_once("200 OK", ROOTS);
    let status = ExplorerClient::new(base, 100)
        .root_status(51, "bagaA:bagaMissing")
        .expect("status");
    assert_eq!(status, None);
    server.join().expect("server");
}

#[test]
fn http_error_status_is_surfaced() {
    let (base, server) = serve_once("404 Not Found", "{}");
    let err = ExplorerClient::new(base, 100)
        .fetch_roots(9)
        .expect_err("404");
    assert!(matches!(err, ExplorerError::Status { status: 404, .. }), "{err}");
    server.join().expect("server");
}

#[test]
fn malformed_body_is_a_decode_error() {
    let (base, server) = serve_once("200 OK", "{\"data\": 5}");
    let err = ExplorerClient::new(base, 100)
        .fetch_roots(9)
        .expect_err("decode");
    assert!(matches!(err, ExplorerError::Decode { .. }), "{err}");
    server.join().expect("server");
}

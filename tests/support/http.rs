//! HTTP fixtures for session tests: a range-honoring wiremock responder and a
//! raw socket server for responses wiremock cannot produce.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Serves `body`, honoring `Range: bytes=start-end` with 206 responses.
pub struct RangeResponder {
    body: Vec<u8>,
}

impl RangeResponder {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }
}

impl Respond for RangeResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let Some(range) = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
        else {
            return ResponseTemplate::new(200).set_body_bytes(self.body.clone());
        };

        let Some((start, end)) = parse_range(range) else {
            return ResponseTemplate::new(416);
        };
        if start > end || end >= self.body.len() {
            return ResponseTemplate::new(416);
        }

        ResponseTemplate::new(206)
            .insert_header(
                "Content-Range",
                format!("bytes {start}-{end}/{}", self.body.len()).as_str(),
            )
            .set_body_bytes(self.body[start..=end].to_vec())
    }
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let bytes = value.strip_prefix("bytes=")?;
    let (start, end) = bytes.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Mounts `HEAD` and `GET` for `route` serving `body`.
///
/// With `ranged` the probe advertises `Accept-Ranges: bytes` and `GET`
/// honors `Range`; without it `GET` always returns the whole body.
pub async fn mount_resource(server: &MockServer, route: &str, body: Vec<u8>, ranged: bool) {
    let mut head = ResponseTemplate::new(200)
        .insert_header("Content-Length", body.len().to_string().as_str());
    if ranged {
        head = head.insert_header("Accept-Ranges", "bytes");
    }
    Mock::given(method("HEAD"))
        .and(path(route))
        .respond_with(head)
        .mount(server)
        .await;

    if ranged {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(RangeResponder::new(body))
            .mount(server)
            .await;
    } else {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .mount(server)
            .await;
    }
}

/// Deterministic non-repeating-looking payload of `len` bytes.
pub fn payload(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| u8::try_from((i * 31 + i / 251) % 256).unwrap_or(0))
        .collect()
}

/// Minimal HTTP/1.1 server answering every request with the same raw
/// response head and no body. Records request lines.
pub struct RawHttpServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl RawHttpServer {
    /// Starts serving `response_head` (status line plus headers, without the
    /// terminating blank line) on a background thread.
    pub fn start(response_head: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let response = format!("{response_head}\r\nConnection: close\r\n\r\n");

        let recorded = Arc::clone(&requests);
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else {
                    continue;
                };
                let mut reader = BufReader::new(match stream.try_clone() {
                    Ok(clone) => clone,
                    Err(_) => continue,
                });

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut line = String::new();
                    match reader.read_line(&mut line) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if line == "\r\n" || line == "\n" => break,
                        Ok(_) => {}
                    }
                }

                if let Ok(mut log) = recorded.lock() {
                    log.push(request_line.trim_end().to_string());
                }
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Ok(Self { addr, requests })
    }

    pub fn url(&self, route: &str) -> String {
        format!("http://{}{route}", self.addr)
    }

    /// Request lines received so far, e.g. `HEAD /file.bin HTTP/1.1`.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }
}

//! Simple HTTP health, leadership and metrics server (synchronous)

use crate::config::MetricsConfig;
use crate::leader::Leadership;
use crate::metrics::Metrics;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Status code, content type and body of one response
type Response = (u16, &'static str, String);

/// Health server state
pub struct HealthServer {
    metrics: Arc<Metrics>,
    leadership: Arc<dyn Leadership>,
    ready: AtomicBool,
    running: AtomicBool,
}

impl HealthServer {
    /// Create a new health server
    pub fn new(metrics: Arc<Metrics>, leadership: Arc<dyn Leadership>) -> Self {
        Self {
            metrics,
            leadership,
            ready: AtomicBool::new(false),
            running: AtomicBool::new(true),
        }
    }

    /// Set the ready state
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if the server is ready
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Stop the server
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Start the health server (blocking, run in separate thread)
    pub fn run(self: Arc<Self>, config: &MetricsConfig) -> std::io::Result<()> {
        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;
        info!("Health server listening on {}", config.listen_addr);

        while self.running.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    if let Err(e) = self.handle_connection(stream) {
                        error!("Health connection error: {}", e);
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    std::thread::sleep(std::time::Duration::from_millis(100));
                }
                Err(e) => {
                    error!("Health server accept error: {}", e);
                }
            }
        }

        info!("Health server stopped");
        Ok(())
    }

    /// Handle a single HTTP connection
    fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;

        let mut reader = BufReader::new(&stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line)?;

        let (status, content_type, body) = self.route(&request_line);
        send_response(&mut stream, status, content_type, &body)
    }

    /// Map a request line such as `GET /ready HTTP/1.1` to a response
    fn route(&self, request_line: &str) -> Response {
        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return (400, "text/plain", "Bad Request".to_string());
        }
        if parts[0] != "GET" {
            return (405, "text/plain", "Method Not Allowed".to_string());
        }

        match parts[1] {
            "/health" | "/healthz" => (200, "application/json", r#"{"status":"healthy"}"#.to_string()),
            "/ready" | "/readyz" => {
                if self.is_ready() {
                    (200, "application/json", r#"{"status":"ready"}"#.to_string())
                } else {
                    (503, "application/json", r#"{"status":"not ready"}"#.to_string())
                }
            }
            "/leader" => {
                let is_leader = self.leadership.is_leader();
                match self.leadership.current_leader().and_then(|l| l.to_json()) {
                    Ok(leader) => (
                        200,
                        "application/json",
                        format!(r#"{{"is_leader":{is_leader},"leader":{leader}}}"#),
                    ),
                    Err(_) => (
                        503,
                        "application/json",
                        format!(r#"{{"is_leader":{is_leader},"leader":null}}"#),
                    ),
                }
            }
            "/metrics" => (200, "text/plain; version=0.0.4", self.metrics.gather()),
            _ => (404, "text/plain", "Not Found".to_string()),
        }
    }
}

/// Send HTTP response
fn send_response(
    stream: &mut TcpStream,
    status: u16,
    content_type: &str,
    body: &str,
) -> std::io::Result<()> {
    let status_text = match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        503 => "Service Unavailable",
        _ => "Unknown",
    };

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        content_type,
        body.len(),
        body
    );

    stream.write_all(response.as_bytes())?;
    stream.flush()
}

//! Prometheus-compatible metrics endpoint
//!
//! Exposes relay server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

const EVENT_HISTORY_LEN: usize = 1000;

/// Metrics registry for the relay server
#[derive(Debug)]
pub struct Metrics {
    // Population
    pub connections_active: AtomicU64,
    pub participants: AtomicU64,
    pub lobbies: AtomicU64,

    // Traffic
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    // Lobby activity
    pub lobbies_created: AtomicU64,
    pub lobby_errors: AtomicU64,
    pub host_migrations: AtomicU64,

    pub rate_limited: AtomicU64,

    // Coordinator event handling (microseconds)
    pub event_count: AtomicU64,
    pub event_time_us: AtomicU64,
    pub event_time_p95_us: AtomicU64,
    pub event_time_p99_us: AtomicU64,
    pub event_time_max_us: AtomicU64,

    start_time: Instant,

    event_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            connections_active: AtomicU64::new(0),
            participants: AtomicU64::new(0),
            lobbies: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            lobbies_created: AtomicU64::new(0),
            lobby_errors: AtomicU64::new(0),
            host_migrations: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
            event_time_us: AtomicU64::new(0),
            event_time_p95_us: AtomicU64::new(0),
            event_time_p99_us: AtomicU64::new(0),
            event_time_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
            event_history: RwLock::new(VecDeque::with_capacity(EVENT_HISTORY_LEN)),
        }
    }

    /// Record how long the coordinator took for one event and update percentiles
    pub fn record_event_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.event_time_us.store(us, Ordering::Relaxed);
        self.event_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.event_history.write();
        history.push_back(us);
        while history.len() > EVENT_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.event_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.event_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.event_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Count one outbound message
    pub fn record_sent(&self, bytes: usize) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Count one inbound message
    pub fn record_received(&self, bytes: usize) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("lobby_sync_connections_active", "Active WebTransport connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("lobby_sync_participants", "Registered participants", "gauge",
            self.participants.load(Ordering::Relaxed));
        metric!("lobby_sync_lobbies", "Live lobbies", "gauge",
            self.lobbies.load(Ordering::Relaxed));

        metric!("lobby_sync_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("lobby_sync_messages_received_total", "Total messages received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("lobby_sync_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("lobby_sync_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));

        metric!("lobby_sync_lobbies_created_total", "Lobbies created", "counter",
            self.lobbies_created.load(Ordering::Relaxed));
        metric!("lobby_sync_lobby_errors_total", "Lobby requests answered with an error", "counter",
            self.lobby_errors.load(Ordering::Relaxed));
        metric!("lobby_sync_host_migrations_total", "Host role reassignments", "counter",
            self.host_migrations.load(Ordering::Relaxed));
        metric!("lobby_sync_rate_limited_total", "Messages dropped by rate limiting", "counter",
            self.rate_limited.load(Ordering::Relaxed));

        metric!("lobby_sync_events_total", "Coordinator events handled", "counter",
            self.event_count.load(Ordering::Relaxed));
        metric!("lobby_sync_event_time_microseconds", "Last event handling time", "gauge",
            self.event_time_us.load(Ordering::Relaxed));
        metric!("lobby_sync_event_time_p95_microseconds", "95th percentile event handling time", "gauge",
            self.event_time_p95_us.load(Ordering::Relaxed));
        metric!("lobby_sync_event_time_p99_microseconds", "99th percentile event handling time", "gauge",
            self.event_time_p99_us.load(Ordering::Relaxed));
        metric!("lobby_sync_event_time_max_microseconds", "Maximum event handling time", "gauge",
            self.event_time_max_us.load(Ordering::Relaxed));

        metric!("lobby_sync_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "population": {{
    "connections": {},
    "participants": {},
    "lobbies": {}
  }},
  "network": {{
    "messages_sent": {},
    "messages_received": {},
    "bytes_sent": {},
    "bytes_received": {},
    "rate_limited": {}
  }},
  "lobby": {{
    "created": {},
    "errors": {},
    "host_migrations": {}
  }},
  "performance": {{
    "events": {},
    "event_time_us": {},
    "event_time_p95_us": {},
    "event_time_p99_us": {},
    "event_time_max_us": {},
    "uptime_seconds": {}
  }}
}}"#,
            self.connections_active.load(Ordering::Relaxed),
            self.participants.load(Ordering::Relaxed),
            self.lobbies.load(Ordering::Relaxed),
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.rate_limited.load(Ordering::Relaxed),
            self.lobbies_created.load(Ordering::Relaxed),
            self.lobby_errors.load(Ordering::Relaxed),
            self.host_migrations.load(Ordering::Relaxed),
            self.event_count.load(Ordering::Relaxed),
            self.event_time_us.load(Ordering::Relaxed),
            self.event_time_p95_us.load(Ordering::Relaxed),
            self.event_time_p99_us.load(Ordering::Relaxed),
            self.event_time_max_us.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Route one request line to a response
fn route(request: &str, metrics: &Metrics) -> String {
    if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        http_response("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        http_response("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&request, &metrics);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_event_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_event_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.event_count.load(Ordering::Relaxed), 100);
        assert!(metrics.event_time_p95_us.load(Ordering::Relaxed) >= 1000);
        assert_eq!(metrics.event_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_traffic_counters() {
        let metrics = Metrics::new();
        metrics.record_sent(40);
        metrics.record_sent(2);
        metrics.record_received(10);

        assert_eq!(metrics.messages_sent.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.bytes_sent.load(Ordering::Relaxed), 42);
        assert_eq!(metrics.bytes_received.load(Ordering::Relaxed), 10);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.lobbies.store(3, Ordering::Relaxed);
        metrics.participants.store(7, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("lobby_sync_lobbies 3"));
        assert!(output.contains("lobby_sync_participants 7"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.host_migrations.store(2, Ordering::Relaxed);

        let output = metrics.to_json();

        assert!(output.contains("\"host_migrations\": 2"));
        assert!(output.contains("\"population\":"));
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(route("GET /metrics/json HTTP/1.1", &metrics).contains("application/json"));
        assert!(route("GET /metrics HTTP/1.1", &metrics).contains("lobby_sync_uptime_seconds"));
        assert!(route("GET /health HTTP/1.1", &metrics).ends_with("OK"));
        assert!(route("POST /metrics HTTP/1.1", &metrics).starts_with("HTTP/1.1 404"));
    }
}

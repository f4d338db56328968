//! WebTransport server implementation
//!
//! Accepts sessions, assigns each a participant id and forwards everything it
//! hears to the session coordinator. Per connection there is one reader task
//! for the reliable stream, one writer task draining the outbox and a
//! datagram loop.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use wtransport::endpoint::IncomingSession;
use wtransport::{Connection, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::lobby::ParticipantId;
use crate::metrics::Metrics;
use crate::net::dos_protection::{DoSConfig, DoSError, DoSProtection};
use crate::net::framing::{self, FramingError};
use crate::net::protocol::{decode, ClientMessage};
use crate::net::relay::{self, OutboxReceiver};
use crate::net::session::{EventSender, SessionEvent};
use crate::net::tls::TlsConfig;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    events: EventSender,
    dos_protection: Arc<Mutex<DoSProtection>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Create a new WebTransport server feeding `events`
    pub async fn new(
        config: ServerConfig,
        events: EventSender,
        metrics: Arc<Metrics>,
    ) -> anyhow::Result<Self> {
        let tls_config =
            TlsConfig::load(config.tls_cert_path.as_deref(), config.tls_key_path.as_deref())
                .await?;
        let dos_protection = Arc::new(Mutex::new(DoSProtection::new(DoSConfig {
            max_connections_total: config.max_connections,
            max_messages_per_second: config.max_messages_per_second,
            ..Default::default()
        })));

        Ok(Self {
            config,
            tls_config,
            events,
            dos_protection,
            metrics,
        })
    }

    /// Certificate hash clients pin
    pub fn cert_hash(&self) -> &str {
        self.tls_config.cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the accept loop
    pub async fn run(self) -> anyhow::Result<()> {
        use wtransport::Endpoint;

        let bind_addr = self.bind_addr();
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_address(bind_addr)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        tracing::info!("WebTransport server listening on {}", bind_addr);

        loop {
            let incoming = server.accept().await;

            let events = self.events.clone();
            let dos = self.dos_protection.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                if let Err(e) = handle_connection(incoming, events, dos, metrics).await {
                    tracing::warn!("Connection error: {}", e);
                }
            });
        }
    }
}

/// What to do with an inbound message after flood checks
enum Admission {
    Accept,
    Drop,
    Disconnect,
}

fn admit(dos: &Mutex<DoSProtection>, metrics: &Metrics, id: &ParticipantId, size: usize) -> Admission {
    match dos.lock().check_message(id, size) {
        Ok(()) => Admission::Accept,
        Err(DoSError::RateLimitExceeded) => {
            metrics.rate_limited.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Rate limit exceeded for {}", id);
            Admission::Drop
        }
        Err(DoSError::ViolationLimitExceeded) => {
            tracing::warn!("Too many violations, disconnecting {}", id);
            Admission::Disconnect
        }
        Err(e) => {
            tracing::warn!("Dropping message from {}: {}", id, e);
            Admission::Drop
        }
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: IncomingSession,
    events: EventSender,
    dos_protection: Arc<Mutex<DoSProtection>>,
    metrics: Arc<Metrics>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;
    let id = ParticipantId::generate();

    if let Err(e) = dos_protection.lock().register_connection(&id) {
        tracing::warn!("Connection rejected by DoS protection: {}", e);
        return Err(anyhow::anyhow!("Connection rejected: {}", e));
    }

    tracing::debug!(
        "New connection from: {:?}, path: {}, id: {}",
        session_request.authority(),
        session_request.path(),
        id
    );

    let result = match session_request.accept().await {
        Ok(connection) => {
            metrics.connections_active.fetch_add(1, Ordering::Relaxed);
            let result = serve(&connection, &id, &events, &dos_protection, &metrics).await;
            metrics.connections_active.fetch_sub(1, Ordering::Relaxed);
            result
        }
        Err(e) => Err(e.into()),
    };

    dos_protection.lock().unregister_connection(&id);
    tracing::debug!("Connection closed (id: {})", id);
    result
}

async fn serve(
    connection: &Connection,
    id: &ParticipantId,
    events: &EventSender,
    dos_protection: &Arc<Mutex<DoSProtection>>,
    metrics: &Arc<Metrics>,
) -> anyhow::Result<()> {
    let (send, recv) = connection.accept_bi().await?;
    tracing::debug!("Accepted bidirectional stream for {}", id);

    let (outbox, outbox_rx) = relay::outbox();
    events
        .send(SessionEvent::Connected {
            id: id.clone(),
            outbox,
        })
        .map_err(|_| anyhow::anyhow!("Session coordinator is gone"))?;

    let writer = tokio::spawn(write_outbox(send, outbox_rx, id.clone(), metrics.clone()));
    let mut reader = tokio::spawn(read_stream(
        recv,
        id.clone(),
        events.clone(),
        dos_protection.clone(),
        metrics.clone(),
    ));

    // Datagrams carry high-frequency playerUpdate only
    loop {
        tokio::select! {
            _ = &mut reader => break,
            datagram = connection.receive_datagram() => {
                let data = match datagram {
                    Ok(data) => data,
                    Err(e) => {
                        tracing::debug!("Datagram receive error: {}", e);
                        break;
                    }
                };

                if let Err(e) = framing::validate_datagram_size(&data) {
                    tracing::debug!("Dropping datagram from {}: {}", id, e);
                    continue;
                }
                match admit(dos_protection, metrics, id, data.len()) {
                    Admission::Accept => {}
                    Admission::Drop => continue,
                    Admission::Disconnect => break,
                }
                metrics.record_received(data.len());

                match decode::<ClientMessage>(&data) {
                    Ok(message @ ClientMessage::PlayerUpdate(_)) => {
                        if events.send(SessionEvent::Message { id: id.clone(), message }).is_err() {
                            break;
                        }
                    }
                    Ok(other) => {
                        tracing::debug!("Ignoring {} sent as datagram", other.kind());
                    }
                    Err(e) => {
                        tracing::debug!("Failed to decode datagram: {}", e);
                    }
                }
            }
        }
    }

    reader.abort();
    let _ = events.send(SessionEvent::Disconnected { id: id.clone() });
    // Coordinator drops the outbox on disconnect; stop writing regardless
    writer.abort();
    Ok(())
}

/// Reliable stream reader: frame, flood-check, decode, forward
async fn read_stream(
    mut recv: RecvStream,
    id: ParticipantId,
    events: EventSender,
    dos_protection: Arc<Mutex<DoSProtection>>,
    metrics: Arc<Metrics>,
) {
    loop {
        let data = match framing::read_message(&mut recv).await {
            Ok(data) => data,
            Err(FramingError::ConnectionClosed) => {
                tracing::debug!("Stream closed by {}", id);
                break;
            }
            Err(e) => {
                tracing::warn!("Stream read error from {}: {}", id, e);
                break;
            }
        };

        match admit(&dos_protection, &metrics, &id, data.len()) {
            Admission::Accept => {}
            Admission::Drop => continue,
            Admission::Disconnect => break,
        }
        metrics.record_received(data.len() + 4);

        let message: ClientMessage = match decode(&data) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!("Failed to decode client message from {}: {}", id, e);
                continue;
            }
        };

        if events
            .send(SessionEvent::Message {
                id: id.clone(),
                message,
            })
            .is_err()
        {
            break;
        }
    }
}

/// Drain the outbox onto the reliable stream
async fn write_outbox(
    mut send: SendStream,
    mut outbox: OutboxReceiver,
    id: ParticipantId,
    metrics: Arc<Metrics>,
) {
    while let Some(message) = outbox.recv().await {
        match framing::send(&mut send, &message).await {
            Ok(bytes) => metrics.record_sent(bytes + 4),
            Err(e) => {
                tracing::debug!("Failed to send {} to {}: {}", message.kind(), id, e);
                break;
            }
        }
    }
}

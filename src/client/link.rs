//! Client link – background thread owning the WebTransport connection.
//!
//! ```text
//! Game thread               │  Link thread (current-thread Tokio)
//! ──────────────────────────┼──────────────────────────────────────
//! handle.poll()             │  read stream → LinkEvent::Message
//!   → session.apply(event)  │    → events.try_send(..)
//!                           │
//! handle.send(outbound)     │  outbound.recv()
//!   → outbound.send(..)     │    → datagram (unreliable) or stream
//! ```
//!
//! The game thread never touches async code; it drains a crossbeam
//! receiver once per frame.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wtransport::tls::Sha256Digest;
use wtransport::{ClientConfig, Connection, Endpoint};

use crate::net::framing;
use crate::net::protocol::{self, ClientMessage, ServerMessage};
use crate::net::tls::decode_cert_hash;

#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// e.g. `https://127.0.0.1:4433`
    pub url: String,
    /// Base64 SHA-256 of the server certificate, as the server logs it.
    /// `None` validates against the platform roots.
    pub cert_hash: Option<String>,
    /// Inbound events buffered before dropping
    pub event_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            url: "https://127.0.0.1:4433".into(),
            cert_hash: None,
            event_buffer: 1024,
        }
    }
}

/// How a message travels to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Ordered stream
    Reliable,
    /// Datagram when it fits; may be dropped or reordered
    Unreliable,
}

/// A message queued for the link thread
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub message: ClientMessage,
    pub delivery: Delivery,
}

impl Outbound {
    pub fn reliable(message: ClientMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Reliable,
        }
    }

    pub fn unreliable(message: ClientMessage) -> Self {
        Self {
            message,
            delivery: Delivery::Unreliable,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Connected,
    Message(ServerMessage),
    Disconnected { reason: String },
}

/// Owned by the game thread
pub struct LinkHandle {
    events: Receiver<LinkEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
    _thread: thread::JoinHandle<()>,
}

impl LinkHandle {
    /// Drain all pending events without blocking
    pub fn poll(&self) -> Vec<LinkEvent> {
        let mut out = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }

    /// Queue a message. Returns false once the link thread has ended.
    pub fn send(&self, outbound: Outbound) -> bool {
        self.outbound.send(outbound).is_ok()
    }
}

/// Spawn the link thread and return the game-side handle
pub fn spawn(config: LinkConfig) -> Result<LinkHandle> {
    let (event_tx, event_rx) = crossbeam_channel::bounded(config.event_buffer.max(1));
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

    let handle = thread::Builder::new()
        .name("lobby-sync-link".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    emit(&event_tx, LinkEvent::Disconnected {
                        reason: format!("Runtime start failed: {}", e),
                    });
                    return;
                }
            };

            let reason = match runtime.block_on(run_link(&config, &event_tx, outbound_rx)) {
                Ok(()) => "Closed".to_string(),
                Err(e) => format!("{:#}", e),
            };
            info!("Link ended: {}", reason);
            emit(&event_tx, LinkEvent::Disconnected { reason });
        })
        .context("Failed to spawn link thread")?;

    Ok(LinkHandle {
        events: event_rx,
        outbound: outbound_tx,
        _thread: handle,
    })
}

/// Deliver to the game thread; drop and warn when it falls behind
fn emit(events: &Sender<LinkEvent>, event: LinkEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            warn!("Link event buffer full, dropping {:?}", event);
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}

fn client_config(config: &LinkConfig) -> Result<ClientConfig> {
    let builder = ClientConfig::builder().with_bind_default();
    let client = match &config.cert_hash {
        Some(hash) => {
            let digest = Sha256Digest::new(decode_cert_hash(hash)?);
            builder.with_server_certificate_hashes([digest]).build()
        }
        None => builder.with_native_certs().build(),
    };
    Ok(client)
}

async fn run_link(
    config: &LinkConfig,
    events: &Sender<LinkEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) -> Result<()> {
    info!("Connecting to {}", config.url);

    let endpoint = Endpoint::client(client_config(config)?)?;
    let connection = endpoint
        .connect(config.url.as_str())
        .await
        .context("WebTransport connect failed")?;
    let (mut send, recv) = connection
        .open_bi()
        .await?
        .await
        .context("Failed to open stream")?;

    emit(events, LinkEvent::Connected);

    let reader_events = events.clone();
    let mut reader = tokio::spawn(read_stream(recv, reader_events));

    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(Outbound { message, delivery }) = message else {
                    // Game side dropped the handle
                    break;
                };
                if delivery == Delivery::Reliable || !send_datagram(&connection, &message) {
                    framing::send(&mut send, &message).await?;
                }
            }
            result = &mut reader => {
                return match result {
                    Ok(r) => r,
                    Err(e) => Err(e.into()),
                };
            }
        }
    }

    reader.abort();
    Ok(())
}

/// Unreliable position updates use a datagram when they fit
fn send_datagram(connection: &Connection, message: &ClientMessage) -> bool {
    if !matches!(message, ClientMessage::PlayerUpdate(_)) {
        return false;
    }
    let Ok(data) = protocol::encode(message) else {
        return false;
    };
    if framing::validate_datagram_size(&data).is_err() {
        return false;
    }
    match connection.send_datagram(data) {
        Ok(()) => true,
        Err(e) => {
            debug!("Datagram send failed, using stream: {}", e);
            false
        }
    }
}

async fn read_stream(mut recv: wtransport::RecvStream, events: Sender<LinkEvent>) -> Result<()> {
    loop {
        match framing::recv::<_, ServerMessage>(&mut recv).await {
            Ok(message) => emit(&events, LinkEvent::Message(message)),
            Err(framing::FramingError::Decode(e)) => {
                warn!("Skipping undecodable server message: {}", e);
            }
            Err(framing::FramingError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_drops_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        emit(&tx, LinkEvent::Connected);
        emit(&tx, LinkEvent::Message(ServerMessage::HostChanged));

        assert_eq!(rx.try_recv(), Ok(LinkEvent::Connected));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_client_config_rejects_bad_hash() {
        let config = LinkConfig {
            cert_hash: Some("not base64!".into()),
            ..Default::default()
        };
        assert!(client_config(&config).is_err());
    }

    #[test]
    fn test_unreachable_server_reports_disconnect() {
        let handle = spawn(LinkConfig {
            url: "not a url".into(),
            ..Default::default()
        })
        .unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let event = loop {
            if let Some(event) = handle.poll().into_iter().next() {
                break event;
            }
            assert!(std::time::Instant::now() < deadline, "no event");
            std::thread::sleep(std::time::Duration::from_millis(10));
        };
        assert!(matches!(event, LinkEvent::Disconnected { .. }));
    }
}

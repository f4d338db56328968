//! Fan-out of server messages to connection outboxes
//!
//! Each connection's writer task drains its outbox; sending here never blocks.

use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::lobby::ParticipantId;
use crate::net::protocol::ServerMessage;

/// Sending half of a connection's outbox
pub type Outbox = mpsc::UnboundedSender<ServerMessage>;

/// Receiving half, owned by the connection's writer task
pub type OutboxReceiver = mpsc::UnboundedReceiver<ServerMessage>;

pub fn outbox() -> (Outbox, OutboxReceiver) {
    mpsc::unbounded_channel()
}

/// Addressing primitive over all live connections
#[derive(Default)]
pub struct BroadcastRelay {
    outboxes: HashMap<ParticipantId, Outbox>,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: ParticipantId, outbox: Outbox) {
        self.outboxes.insert(id, outbox);
    }

    pub fn detach(&mut self, id: &ParticipantId) -> bool {
        self.outboxes.remove(id).is_some()
    }

    pub fn is_attached(&self, id: &ParticipantId) -> bool {
        self.outboxes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.outboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outboxes.is_empty()
    }

    /// Send to one connection. Returns whether it was queued.
    pub fn send_to_one(&self, target: &ParticipantId, message: ServerMessage) -> bool {
        let Some(outbox) = self.outboxes.get(target) else {
            debug!("Dropping {} for detached {}", message.kind(), target);
            return false;
        };
        match outbox.send(message) {
            Ok(()) => true,
            Err(e) => {
                // Writer already gone; disconnect event is on its way
                debug!("Outbox closed for {}, dropped {}", target, e.0.kind());
                false
            }
        }
    }

    /// Send to a set of connections, optionally skipping one
    pub fn send_to_set<'a, I>(
        &self,
        members: I,
        except: Option<&ParticipantId>,
        message: &ServerMessage,
    ) -> usize
    where
        I: IntoIterator<Item = &'a ParticipantId>,
    {
        members
            .into_iter()
            .filter(|id| Some(*id) != except)
            .filter(|id| self.send_to_one(id, message.clone()))
            .count()
    }

    /// Send to every connection except the sender
    pub fn broadcast_except(&self, sender: &ParticipantId, message: &ServerMessage) -> usize {
        self.send_to_set(self.outboxes.keys(), Some(sender), message)
    }

    /// Send to every connection
    pub fn broadcast_all(&self, message: &ServerMessage) -> usize {
        self.send_to_set(self.outboxes.keys(), None, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> ParticipantId {
        ParticipantId::from(s)
    }

    fn drain(rx: &mut OutboxReceiver) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_broadcast_except_skips_sender() {
        let mut relay = BroadcastRelay::new();
        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        relay.attach(pid("a"), tx_a);
        relay.attach(pid("b"), tx_b);

        let sent = relay.broadcast_except(&pid("a"), &ServerMessage::HostChanged);

        assert_eq!(sent, 1);
        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::HostChanged]);
    }

    #[test]
    fn test_send_to_set() {
        let mut relay = BroadcastRelay::new();
        let (tx_a, mut rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        let (tx_c, mut rx_c) = outbox();
        relay.attach(pid("a"), tx_a);
        relay.attach(pid("b"), tx_b);
        relay.attach(pid("c"), tx_c);

        let members = [pid("a"), pid("b")];
        relay.send_to_set(&members, None, &ServerMessage::HostChanged);

        assert_eq!(drain(&mut rx_a).len(), 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
    }

    #[test]
    fn test_closed_outbox_is_not_an_error() {
        let mut relay = BroadcastRelay::new();
        let (tx_a, rx_a) = outbox();
        let (tx_b, mut rx_b) = outbox();
        relay.attach(pid("a"), tx_a);
        relay.attach(pid("b"), tx_b);
        drop(rx_a);

        let sent = relay.broadcast_all(&ServerMessage::HostChanged);

        assert_eq!(sent, 1);
        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(!relay.send_to_one(&pid("missing"), ServerMessage::HostChanged));
    }
}

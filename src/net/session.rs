//! Session coordinator
//!
//! Single owner of the participant registry, the lobby table and the relay.
//! Transport tasks feed it [`SessionEvent`]s over one channel; every event is
//! handled to completion before the next one is looked at.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::lobby::{
    LobbyCode, LobbyError, LobbyTable, ParticipantId, ParticipantRegistry, RegistryError,
    StateUpdate,
};
use crate::metrics::Metrics;
use crate::net::protocol::{ClientMessage, PlayerPayload, ServerMessage};
use crate::net::relay::{BroadcastRelay, Outbox};

/// Inbound event for the coordinator
#[derive(Debug)]
pub enum SessionEvent {
    /// Transport accepted a session and assigned it an id
    Connected { id: ParticipantId, outbox: Outbox },
    Message { id: ParticipantId, message: ClientMessage },
    Disconnected { id: ParticipantId },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    InLobby(LobbyCode),
    Disconnected,
}

pub struct SessionCoordinator {
    registry: ParticipantRegistry,
    lobbies: LobbyTable,
    relay: BroadcastRelay,
    metrics: Arc<Metrics>,
    announce_lobby_list: bool,
}

impl SessionCoordinator {
    pub fn new(lobbies: LobbyTable, metrics: Arc<Metrics>) -> Self {
        Self {
            registry: ParticipantRegistry::new(),
            lobbies,
            relay: BroadcastRelay::new(),
            metrics,
            announce_lobby_list: true,
        }
    }

    pub fn from_config(config: &ServerConfig, metrics: Arc<Metrics>) -> Self {
        Self::new(LobbyTable::new(config.max_lobbies), metrics)
            .with_lobby_list_announcements(config.announce_lobby_list)
    }

    /// Push `lobbyList` to every connection whenever the table changes
    pub fn with_lobby_list_announcements(mut self, enabled: bool) -> Self {
        self.announce_lobby_list = enabled;
        self
    }

    pub fn registry(&self) -> &ParticipantRegistry {
        &self.registry
    }

    pub fn lobbies(&self) -> &LobbyTable {
        &self.lobbies
    }

    pub fn state_of(&self, id: &ParticipantId) -> ConnectionState {
        if !self.registry.contains(id) {
            return ConnectionState::Disconnected;
        }
        match self.lobbies.lobby_of(id) {
            Some(code) => ConnectionState::InLobby(code.clone()),
            None => ConnectionState::Connected,
        }
    }

    /// Run on its own task until every event sender is gone
    pub fn spawn(self) -> (EventSender, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (tx, handle)
    }

    pub async fn run(mut self, mut events: EventReceiver) {
        info!("Session coordinator started");
        while let Some(event) = events.recv().await {
            let start = Instant::now();
            self.handle(event);
            self.metrics.record_event_time(start.elapsed());
        }
        info!("Session coordinator stopped");
    }

    /// Apply one event
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { id, outbox } => self.on_connected(id, outbox),
            SessionEvent::Message { id, message } => {
                if !self.registry.contains(&id) {
                    warn!(
                        "Ignoring {}: {}",
                        message.kind(),
                        RegistryError::UnknownParticipant(id)
                    );
                    return;
                }
                self.on_message(id, message);
            }
            SessionEvent::Disconnected { id } => self.on_disconnected(&id),
        }
    }

    fn on_connected(&mut self, id: ParticipantId, outbox: Outbox) {
        debug!("Participant {} connected", id);
        self.registry.register(id.clone());
        self.relay.attach(id.clone(), outbox);

        self.relay
            .send_to_one(&id, ServerMessage::Welcome { id: id.clone() });

        // Backfill the newcomer with everyone already in the pool
        for peer in self.scope_peers(&id) {
            if let Some(payload) = self.payload_of(&peer) {
                self.relay
                    .send_to_one(&id, ServerMessage::PlayerJoined(payload));
            }
        }

        self.sync_population();
    }

    fn on_message(&mut self, id: ParticipantId, message: ClientMessage) {
        match message {
            ClientMessage::PlayerJoined(update) => {
                if let Some(payload) = self.apply_update(&id, &update) {
                    self.relay_to_scope(&id, ServerMessage::PlayerJoined(payload));
                }
            }
            ClientMessage::PlayerUpdate(update) => {
                if let Some(payload) = self.apply_update(&id, &update) {
                    self.relay_to_scope(&id, ServerMessage::PlayerUpdate(payload));
                }
            }
            ClientMessage::CreateLobby { map_name } => self.create_lobby(id, &map_name),
            ClientMessage::JoinLobby { lobby_id } => {
                self.join_lobby(id, &LobbyCode::normalize(&lobby_id))
            }
            ClientMessage::LeaveLobby => self.leave_lobby(&id),
            ClientMessage::RequestLobbyList => {
                let list = self.lobbies.list_all();
                self.relay.send_to_one(&id, ServerMessage::LobbyList(list));
            }
        }
    }

    fn on_disconnected(&mut self, id: &ParticipantId) {
        if !self.registry.contains(id) {
            debug!("Disconnect for unknown participant {}", id);
            return;
        }

        let departure = self.lobbies.leave(id);
        let peers = match &departure {
            Some(departure) => {
                if let Some(new_host) = &departure.new_host {
                    self.promote(new_host, &departure.code);
                }
                departure.remaining.clone()
            }
            None => self.scope_peers(id),
        };

        self.registry.remove(id);
        self.relay.detach(id);

        self.relay.send_to_set(
            &peers,
            None,
            &ServerMessage::PlayerLeft { id: id.clone() },
        );

        if departure.is_some() {
            self.announce_lobbies();
        }
        self.sync_population();
        debug!("Participant {} disconnected", id);
    }

    fn create_lobby(&mut self, id: ParticipantId, map_name: &str) {
        let old_peers = self.scope_peers(&id);

        match self.lobbies.create(&id, map_name) {
            Ok(code) => {
                info!("Lobby {} created by {}", code, id);
                self.metrics.lobbies_created.fetch_add(1, Ordering::Relaxed);
                self.relay
                    .send_to_one(&id, ServerMessage::LobbyCreated { lobby_id: code });
                self.change_scope(&id, old_peers);
                self.announce_lobbies();
            }
            Err(e) => self.reject(&id, e),
        }
    }

    fn join_lobby(&mut self, id: ParticipantId, code: &LobbyCode) {
        let old_peers = self.scope_peers(&id);

        match self.lobbies.join(code, &id) {
            Ok(snapshot) => {
                info!("{} joined lobby {}", id, code);
                self.relay.send_to_one(
                    &id,
                    ServerMessage::JoinedLobby {
                        lobby_id: snapshot.code,
                        map_name: snapshot.map_name,
                        host: snapshot.host,
                        players: snapshot.players,
                    },
                );
                self.change_scope(&id, old_peers);
                self.announce_lobbies();
            }
            Err(e) => self.reject(&id, e),
        }
    }

    fn leave_lobby(&mut self, id: &ParticipantId) {
        let old_peers = self.scope_peers(id);

        let Some(departure) = self.lobbies.leave(id) else {
            debug!("{} asked to leave but is not in a lobby", id);
            return;
        };

        if departure.closed {
            info!("Lobby {} closed", departure.code);
        }
        if let Some(new_host) = &departure.new_host {
            self.promote(new_host, &departure.code);
        }

        self.change_scope(id, old_peers);
        self.announce_lobbies();
    }

    /// Merge an update and build the payload peers should see
    fn apply_update(&mut self, id: &ParticipantId, update: &StateUpdate) -> Option<PlayerPayload> {
        if !update.is_finite() {
            warn!("Dropping non-finite state from {}", id);
            return None;
        }
        match self.registry.update(id, update) {
            Ok(state) => Some(PlayerPayload::from_state(id, state)),
            Err(e @ RegistryError::StaleUpdate(_)) => {
                debug!("{}", e);
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    fn relay_to_scope(&self, id: &ParticipantId, message: ServerMessage) {
        let peers = self.scope_peers(id);
        self.relay.send_to_set(&peers, Some(id), &message);
    }

    /// Everyone sharing `id`'s audience: its lobby, or the lobby-less pool
    fn scope_peers(&self, id: &ParticipantId) -> Vec<ParticipantId> {
        match self.lobbies.lobby_of(id).and_then(|code| self.lobbies.get(code)) {
            Some(lobby) => lobby
                .members()
                .iter()
                .filter(|m| *m != id)
                .cloned()
                .collect(),
            None => self
                .registry
                .ids()
                .filter(|p| *p != id && self.lobbies.lobby_of(p).is_none())
                .cloned()
                .collect(),
        }
    }

    /// Swap a participant's audience after a lobby move
    fn change_scope(&self, id: &ParticipantId, old_peers: Vec<ParticipantId>) {
        for peer in &old_peers {
            self.relay
                .send_to_one(peer, ServerMessage::PlayerLeft { id: id.clone() });
            self.relay
                .send_to_one(id, ServerMessage::PlayerLeft { id: peer.clone() });
        }

        let Some(mover) = self.payload_of(id) else {
            return;
        };
        for peer in self.scope_peers(id) {
            self.relay
                .send_to_one(&peer, ServerMessage::PlayerJoined(mover.clone()));
            if let Some(payload) = self.payload_of(&peer) {
                self.relay
                    .send_to_one(id, ServerMessage::PlayerJoined(payload));
            }
        }
    }

    fn promote(&self, new_host: &ParticipantId, code: &LobbyCode) {
        info!("Host of lobby {} passed to {}", code, new_host);
        self.metrics.host_migrations.fetch_add(1, Ordering::Relaxed);
        self.relay.send_to_one(new_host, ServerMessage::HostChanged);
    }

    fn reject(&self, id: &ParticipantId, error: LobbyError) {
        debug!("Lobby request from {} failed: {}", id, error);
        self.metrics.lobby_errors.fetch_add(1, Ordering::Relaxed);
        self.relay.send_to_one(
            id,
            ServerMessage::LobbyError {
                message: error.to_string(),
            },
        );
    }

    fn announce_lobbies(&self) {
        self.metrics
            .lobbies
            .store(self.lobbies.len() as u64, Ordering::Relaxed);
        if self.announce_lobby_list {
            self.relay
                .broadcast_all(&ServerMessage::LobbyList(self.lobbies.list_all()));
        }
    }

    fn payload_of(&self, id: &ParticipantId) -> Option<PlayerPayload> {
        self.registry
            .get(id)
            .map(|state| PlayerPayload::from_state(id, state))
    }

    fn sync_population(&self) {
        self.metrics
            .participants
            .store(self.registry.len() as u64, Ordering::Relaxed);
        self.metrics
            .lobbies
            .store(self.lobbies.len() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::AnimationTag;
    use crate::net::relay::{outbox, OutboxReceiver};
    use crate::util::vec3::Vec3;

    struct Harness {
        coordinator: SessionCoordinator,
    }

    impl Harness {
        fn new() -> Self {
            let coordinator =
                SessionCoordinator::new(LobbyTable::with_seed(10, 3), Arc::new(Metrics::new()))
                    .with_lobby_list_announcements(false);
            Self { coordinator }
        }

        fn connect(&mut self, name: &str) -> (ParticipantId, OutboxReceiver) {
            let id = ParticipantId::from(name);
            let (tx, rx) = outbox();
            self.coordinator.handle(SessionEvent::Connected {
                id: id.clone(),
                outbox: tx,
            });
            (id, rx)
        }

        fn send(&mut self, id: &ParticipantId, message: ClientMessage) {
            self.coordinator.handle(SessionEvent::Message {
                id: id.clone(),
                message,
            });
        }
    }

    fn drain(rx: &mut OutboxReceiver) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn test_welcome_then_backfill() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (_b, mut rx_b) = h.connect("b");

        let msgs = drain(&mut rx_b);
        assert!(matches!(&msgs[0], ServerMessage::Welcome { id } if id.as_str() == "b"));
        assert!(matches!(&msgs[1], ServerMessage::PlayerJoined(p) if p.id == a));
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_update_not_echoed() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (_b, mut rx_b) = h.connect("b");
        drain(&mut rx_a);
        drain(&mut rx_b);

        h.send(
            &a,
            ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::new(1.0, 1.0, 1.0)).with_animation("walking")),
        );

        assert!(drain(&mut rx_a).is_empty());
        match drain(&mut rx_b).as_slice() {
            [ServerMessage::PlayerUpdate(p)] => {
                assert_eq!(p.id, a);
                assert_eq!(p.animation_state, Some(AnimationTag::Walking));
                assert_eq!(p.rotation, Some(0.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_non_finite_update_dropped() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (_b, mut rx_b) = h.connect("b");
        drain(&mut rx_b);

        h.send(&a, ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::new(f32::NAN, 0.0, 0.0))));

        assert!(drain(&mut rx_b).is_empty());
        assert!(h.coordinator.registry().get(&a).unwrap().position.is_finite());
    }

    #[test]
    fn test_message_from_unknown_participant_ignored() {
        let mut h = Harness::new();
        let (_a, mut rx_a) = h.connect("a");
        drain(&mut rx_a);

        h.send(
            &ParticipantId::from("ghost"),
            ClientMessage::CreateLobby { map_name: "test".to_string() },
        );

        assert!(h.coordinator.lobbies().is_empty());
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_state_transitions() {
        let mut h = Harness::new();
        let (a, _rx) = h.connect("a");
        assert_eq!(h.coordinator.state_of(&a), ConnectionState::Connected);

        h.send(&a, ClientMessage::CreateLobby { map_name: "test".to_string() });
        let code = h.coordinator.lobbies().lobby_of(&a).cloned().unwrap();
        assert_eq!(h.coordinator.state_of(&a), ConnectionState::InLobby(code));

        h.send(&a, ClientMessage::LeaveLobby);
        assert_eq!(h.coordinator.state_of(&a), ConnectionState::Connected);

        h.coordinator.handle(SessionEvent::Disconnected { id: a.clone() });
        assert_eq!(h.coordinator.state_of(&a), ConnectionState::Disconnected);
    }

    #[test]
    fn test_leave_without_lobby_is_noop() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        drain(&mut rx_a);

        h.send(&a, ClientMessage::LeaveLobby);

        assert!(drain(&mut rx_a).is_empty());
        assert_eq!(h.coordinator.state_of(&a), ConnectionState::Connected);
    }

    #[test]
    fn test_lobby_scope_isolates_updates() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, mut rx_b) = h.connect("b");
        let (c, mut rx_c) = h.connect("c");
        h.send(&a, ClientMessage::CreateLobby { map_name: "test".to_string() });
        let code = h.coordinator.lobbies().lobby_of(&a).cloned().unwrap();
        h.send(&b, ClientMessage::JoinLobby { lobby_id: code.to_string() });
        drain(&mut rx_a);
        drain(&mut rx_b);
        drain(&mut rx_c);

        h.send(&a, ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::UP)));
        h.send(&c, ClientMessage::PlayerUpdate(StateUpdate::at(Vec3::UP)));

        assert_eq!(drain(&mut rx_b).len(), 1);
        assert!(drain(&mut rx_c).is_empty());
        assert!(drain(&mut rx_a).is_empty());
    }

    #[test]
    fn test_scope_change_messages() {
        let mut h = Harness::new();
        let (a, mut rx_a) = h.connect("a");
        let (b, mut rx_b) = h.connect("b");
        drain(&mut rx_a);
        drain(&mut rx_b);

        h.send(&a, ClientMessage::CreateLobby { map_name: "test".to_string() });

        // b loses a from the pool, a loses b
        assert_eq!(drain(&mut rx_b), vec![ServerMessage::PlayerLeft { id: a.clone() }]);
        let msgs = drain(&mut rx_a);
        assert!(matches!(&msgs[0], ServerMessage::LobbyCreated { .. }));
        assert_eq!(msgs[1], ServerMessage::PlayerLeft { id: b.clone() });
        assert_eq!(msgs.len(), 2);
    }

    #[test]
    fn test_lobby_list_announcements() {
        let mut h = Harness::new();
        h.coordinator.announce_lobby_list = true;
        let (a, mut rx_a) = h.connect("a");
        let (_b, mut rx_b) = h.connect("b");
        drain(&mut rx_a);
        drain(&mut rx_b);

        h.send(&a, ClientMessage::CreateLobby { map_name: "test".to_string() });

        let lists: Vec<_> = drain(&mut rx_b)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::LobbyList(list) => Some(list),
                _ => None,
            })
            .collect();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].len(), 1);
    }

    #[test]
    fn test_metrics_follow_population() {
        let mut h = Harness::new();
        let (a, _rx_a) = h.connect("a");
        let (_b, _rx_b) = h.connect("b");
        h.send(&a, ClientMessage::CreateLobby { map_name: "test".to_string() });
        h.send(&a, ClientMessage::JoinLobby { lobby_id: "ZZZZZZ".to_string() });

        let metrics = &h.coordinator.metrics;
        assert_eq!(metrics.participants.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.lobbies.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.lobbies_created.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.lobby_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_spawned_coordinator_processes_events() {
        let coordinator =
            SessionCoordinator::new(LobbyTable::with_seed(10, 3), Arc::new(Metrics::new()));
        let (events, handle) = coordinator.spawn();
        let (tx, mut rx) = outbox();
        let id = ParticipantId::from("a");

        events
            .send(SessionEvent::Connected { id: id.clone(), outbox: tx })
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first, ServerMessage::Welcome { id: id.clone() });

        events
            .send(SessionEvent::Message {
                id: id.clone(),
                message: ClientMessage::RequestLobbyList,
            })
            .unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, ServerMessage::LobbyList(list) if list.is_empty()));

        drop(events);
        handle.await.unwrap();
    }
}

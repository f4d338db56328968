//! Per-frame client driver tying link events to the mirror, the lobby
//! tracker and the local player.

use std::sync::Arc;
use tracing::{debug, info};

use crate::client::animation::ClipSet;
use crate::client::link::{LinkEvent, LinkHandle, Outbound};
use crate::client::lobby_client::{LobbyClient, LobbyOutcome};
use crate::client::local::LocalPlayer;
use crate::client::mirror::RemoteMirror;
use crate::client::movement::InputState;
use crate::client::scene::{PhysicsWorld, SceneGraph};
use crate::lobby::player::SPAWN_POSITION;
use crate::net::protocol::ClientMessage;

/// Things the UI layer may want to react to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    Connected,
    Lobby(LobbyOutcome),
    Disconnected { reason: String },
}

pub struct ClientSession<N, B> {
    mirror: RemoteMirror<N, B>,
    lobbies: LobbyClient,
    local: LocalPlayer<B>,
    connected: bool,
    outgoing: Vec<ClientMessage>,
}

impl<N, B> ClientSession<N, B> {
    /// Create the local body at the spawn point
    pub fn new<P: PhysicsWorld<Body = B>>(clips: Arc<ClipSet>, physics: &mut P) -> Self {
        let body = physics.create_body(SPAWN_POSITION);
        Self {
            mirror: RemoteMirror::new(clips),
            lobbies: LobbyClient::new(),
            local: LocalPlayer::new(body),
            connected: false,
            outgoing: Vec::new(),
        }
    }

    pub fn mirror(&self) -> &RemoteMirror<N, B> {
        &self.mirror
    }

    pub fn lobbies(&self) -> &LobbyClient {
        &self.lobbies
    }

    pub fn local(&self) -> &LocalPlayer<B> {
        &self.local
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn create_lobby(&mut self, map_name: &str) {
        let msg = self.lobbies.create_lobby(map_name);
        self.outgoing.push(msg);
    }

    pub fn join_lobby(&mut self, code: &str) {
        let msg = self.lobbies.join_lobby(code);
        self.outgoing.push(msg);
    }

    /// Local failure when not in a lobby; reported as a notice, nothing sent
    pub fn leave_lobby(&mut self) -> Option<SessionNotice> {
        match self.lobbies.leave_lobby() {
            Ok(msg) => {
                self.outgoing.push(msg);
                None
            }
            Err(e) => Some(SessionNotice::Lobby(LobbyOutcome::Failed {
                message: e.to_string(),
                request: None,
            })),
        }
    }

    pub fn request_lobby_list(&mut self) {
        let msg = self.lobbies.request_lobby_list();
        self.outgoing.push(msg);
    }

    /// Apply one event from the link
    pub fn handle_event<S, P>(
        &mut self,
        event: LinkEvent,
        scene: &mut S,
        physics: &mut P,
    ) -> Option<SessionNotice>
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        match event {
            LinkEvent::Connected => {
                info!("Connected to server");
                self.connected = true;
                let joined = self.local.joined_message(physics);
                self.outgoing.insert(0, joined);
                Some(SessionNotice::Connected)
            }
            LinkEvent::Message(message) => {
                debug!("Server message: {}", message.kind());
                if self.mirror.apply(&message, scene, physics) {
                    return None;
                }
                self.lobbies.apply(&message).map(SessionNotice::Lobby)
            }
            LinkEvent::Disconnected { reason } => {
                info!("Disconnected: {}", reason);
                self.connected = false;
                self.mirror.clear(scene, physics);
                self.lobbies.reset();
                self.outgoing.clear();
                Some(SessionNotice::Disconnected { reason })
            }
        }
    }

    /// Advance one frame and return what should go out on the link.
    /// Lobby commands and the join announcement are always reliable.
    pub fn frame<S, P>(
        &mut self,
        dt: f32,
        input: &InputState,
        scene: &mut S,
        physics: &mut P,
    ) -> Vec<Outbound>
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        let update = self.local.tick(dt, input, physics);
        self.mirror.tick(dt, scene, physics);

        if !self.connected {
            return Vec::new();
        }
        let mut out: Vec<Outbound> = self
            .outgoing
            .drain(..)
            .map(Outbound::reliable)
            .collect();
        out.extend(update);
        out
    }

    /// Drain the link, run a frame and send the result
    pub fn pump<S, P>(
        &mut self,
        link: &LinkHandle,
        dt: f32,
        input: &InputState,
        scene: &mut S,
        physics: &mut P,
    ) -> Vec<SessionNotice>
    where
        S: SceneGraph<Node = N>,
        P: PhysicsWorld<Body = B>,
    {
        let notices = link
            .poll()
            .into_iter()
            .filter_map(|event| self.handle_event(event, scene, physics))
            .collect();

        for outbound in self.frame(dt, input, scene, physics) {
            if !link.send(outbound) {
                break;
            }
        }
        notices
    }
}

//! Client side: mirror of remote participants, local movement, lobby
//! tracking and the WebTransport link.
//!
//! Everything except `link` is synchronous and driven once per frame from
//! the game thread.

pub mod animation;
pub mod link;
pub mod local;
pub mod lobby_client;
pub mod mirror;
pub mod movement;
pub mod scene;
pub mod session;

pub use animation::{AnimationPose, AnimationStateMachine, Clip, ClipSet};
pub use link::{Delivery, LinkConfig, LinkEvent, LinkHandle, Outbound};
pub use lobby_client::{ActiveLobby, LobbyClient, LobbyClientError, LobbyOutcome, PendingRequest};
pub use mirror::RemoteMirror;
pub use movement::InputState;
pub use scene::{PhysicsWorld, SceneGraph};
pub use session::{ClientSession, SessionNotice};

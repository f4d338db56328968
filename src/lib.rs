//! lobby-sync
//!
//! Real-time session synchronization for a lightweight multiplayer 3D game,
//! over WebTransport.
//!
//! The server side tracks connected participants, runs ephemeral lobbies and
//! relays each participant's position, yaw and animation to the right
//! audience. The client side mirrors remote participants from those relayed
//! events and keeps their animation state machines in step.
//!
//! # Features
//!
//! - `client` - Remote participant mirror, animation state machine, movement sampler, lobby tracker and link (enabled by default)
//! - `dos_ratelimit` - Per-message rate limiting; connection caps are always on (enabled by default)

pub mod config;
pub mod lobby;
pub mod metrics;
pub mod net;
pub mod util;

#[cfg(feature = "client")]
pub mod client;

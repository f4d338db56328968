//! Networking: wire protocol, framing, relay, session coordinator and the
//! WebTransport server.

pub mod dos_protection;
pub mod framing;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod tls;
pub mod transport;

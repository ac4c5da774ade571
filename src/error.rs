use std::io;

use thiserror::Error;

/// Failure modes surfaced by the gateway's core components.
///
/// Each variant corresponds to one of the error kinds a session can hit
/// during its lifetime; the HTTP front dispatcher and the watchdog both
/// collapse these into a best-effort response or a `TERMINATING` transition
/// rather than panicking.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("failed to spawn backend process: {0}")]
    Spawn(#[source] io::Error),

    #[error("backend did not announce a control port within the handshake budget")]
    HandshakeTimeout,

    #[error("backend announced a malformed control port: {0:?}")]
    MalformedPortAnnouncement(String),

    #[error("failed to connect to backend control socket: {0}")]
    ControlConnect(#[source] io::Error),

    #[error("session capacity exceeded (max {max})")]
    CapacityExceeded { max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, GatewayError>;

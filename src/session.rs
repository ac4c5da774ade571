use std::collections::VecDeque;
use std::time::Instant;

use crate::child::BackendHandle;
use crate::config::SESSION_TIMEOUT;
use crate::message::Message;

/// Lifecycle state of a session.
///
/// `WaitingForPort` only exists for the brief window between spawning the
/// child and completing the control-socket handshake; by the time a
/// `Session` is inserted into the registry it is already `Normal` or the
/// spawn failed outright. It is kept as an explicit state (rather than
/// folded into `Normal`) because the watchdog must not reap a session for
/// inactivity before it has ever become active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    WaitingForPort,
    Normal,
    Terminating,
}

/// One multiplexed tab: a backend process, its two pending queues, and the
/// bookkeeping the watchdog and workers need to drive it.
///
/// Every field here is owned by the session's entry in the registry and is
/// only ever touched while the registry's mutex is held - see the module
/// docs on `crate::registry` for the locking discipline.
pub struct Session {
    pub token: String,
    pub status: SessionStatus,
    pub is_idle: bool,
    pub backend: BackendHandle,

    /// Plain text queued to be written to the backend's stdin pipe.
    pub inbox_text: String,
    /// Structured messages queued to be sent over the control socket.
    pub inbox_msgs: VecDeque<Message>,

    /// Plain text accumulated from the backend's stdout pipe, not yet
    /// folded into an `OUTPUT_OTHER` message.
    pub outbox_text: String,
    /// Raw bytes read from the control socket, not yet decoded.
    pub outbox_raw: Vec<u8>,
    /// Fully decoded messages ready to be harvested by an HTTP request.
    pub outbox_msgs: VecDeque<Message>,

    pub last_touch: Instant,
    pub should_terminate: bool,
    pub inbox_alive: bool,
    pub outbox_alive: bool,
}

impl Session {
    pub fn new(token: String, backend: BackendHandle) -> Self {
        Self {
            token,
            status: SessionStatus::Normal,
            is_idle: true,
            backend,
            inbox_text: String::new(),
            inbox_msgs: VecDeque::new(),
            outbox_text: String::new(),
            outbox_raw: Vec::new(),
            outbox_msgs: VecDeque::new(),
            last_touch: Instant::now(),
            should_terminate: false,
            inbox_alive: true,
            outbox_alive: true,
        }
    }

    pub fn backend_pid(&self) -> i32 {
        self.backend.pid as i32
    }

    pub fn touch(&mut self) {
        self.last_touch = Instant::now();
        self.is_idle = false;
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_touch) >= SESSION_TIMEOUT
    }

    /// True once both workers have observed `should_terminate` and exited.
    pub fn fully_drained(&self) -> bool {
        !self.inbox_alive && !self.outbox_alive
    }
}

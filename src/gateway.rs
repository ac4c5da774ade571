//! Ties the registry, config and workers together. This is the one place
//! that spawns a backend and then, separately, takes the registry lock to
//! record it - never both at once.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::info;

use crate::child::{self, BackendHandle};
use crate::config::{Config, EVAL_POLL_INTERVAL, EVAL_TIMEOUT};
use crate::error::{GatewayError, Result};
use crate::message::Message;
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;
use crate::workers::{inbox, outbox};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Gateway {
    pub registry: Arc<Mutex<SessionRegistry>>,
    pub config: Config,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(Mutex::new(SessionRegistry::new(config.max_sessions)));
        Self { registry, config }
    }

    fn spawn_backend(&self) -> Result<BackendHandle> {
        child::spawn_backend(&self.config.backend_program, &self.config.backend_args, HANDSHAKE_TIMEOUT)
    }

    /// Spawns a brand-new, immediately-active session.
    pub fn spawn_session(&self) -> Result<String> {
        if !self.registry.lock().has_capacity() {
            return Err(GatewayError::CapacityExceeded {
                max: self.config.max_sessions,
            });
        }
        let backend = self.spawn_backend()?;
        self.insert_and_start(backend, false)
    }

    /// Claims a pre-warmed idle session if one is available, else spawns
    /// a fresh one. This is what the HTTP front dispatcher calls when a
    /// browser tab shows up without a recognized session token.
    pub fn acquire_session(&self) -> Result<String> {
        if let Some(token) = self.registry.lock().claim_idle() {
            return Ok(token);
        }
        self.spawn_session()
    }

    /// Spawns one idle session, but only once the registry is completely
    /// empty (spec.md §4.6 step 4). Called by the watchdog.
    pub fn top_up_idle_pool(&self) {
        let should_spawn = self.registry.lock().count() == 0;
        if !should_spawn {
            return;
        }
        match self.spawn_backend() {
            Ok(backend) => {
                if let Err(err) = self.insert_and_start(backend, true) {
                    tracing::warn!(error = %err, "failed to register pre-warmed idle backend");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to pre-warm idle backend");
            }
        }
    }

    fn insert_and_start(&self, backend: BackendHandle, idle: bool) -> Result<String> {
        let dups = self.dup_all(&backend)?;
        let outcome = if idle {
            self.registry.lock().insert_idle(backend)
        } else {
            self.registry.lock().create_with_handle(backend)
        };
        match outcome {
            Ok(token) => {
                // The real control-socket handshake already completed
                // synchronously in `child::spawn_backend`, so this port
                // unblocks straight into `Normal` rather than passing
                // through the outbox worker's `WaitingForPort` branch.
                // That branch is also where `spec.md` §4.5 says the
                // handshake completion enqueues `OUTPUT_READY`, so this is
                // done here instead to preserve that externally-visible
                // contract.
                if let Some(session) = self.registry.lock().lookup(&token) {
                    session.outbox_msgs.push_back(crate::message::Message::new(
                        crate::message::MessageKind::OutputReady,
                        vec![],
                    ));
                }
                self.start_workers(token.clone(), dups);
                info!(event = "session_count", count = self.registry.lock().count());
                Ok(token)
            }
            Err(mut backend) => {
                backend.kill_and_reap();
                Err(GatewayError::CapacityExceeded {
                    max: self.config.max_sessions,
                })
            }
        }
    }

    fn dup_all(&self, backend: &BackendHandle) -> Result<WorkerFds> {
        Ok(WorkerFds {
            stdin: backend.dup_stdin()?,
            stdout: backend.dup_stdout()?,
            ctrl_in: backend.dup_ctrl_sock()?,
            ctrl_out: backend.dup_ctrl_sock()?,
        })
    }

    fn start_workers(&self, token: String, fds: WorkerFds) {
        inbox::spawn(self.registry.clone(), token.clone(), fds.stdin, fds.ctrl_in);
        outbox::spawn(self.registry.clone(), token, fds.stdout, fds.ctrl_out);
    }

    /// Whether `token` names a currently registered session. The HTTP
    /// dispatcher uses this to decide whether an incoming `SESSION_TOKEN`
    /// cookie is still meaningful or should be treated as absent.
    pub fn session_exists(&self, token: &str) -> bool {
        !token.is_empty() && self.registry.lock().lookup(token).is_some()
    }

    /// Sets `should_terminate` on a session without waiting for it to
    /// actually exit; the watchdog does the rest on its next sweep.
    pub fn mark_terminate(&self, token: &str) {
        if let Some(session) = self.registry.lock().lookup(token) {
            session.should_terminate = true;
        }
    }

    /// Pushes a message onto a session's control-socket outbound queue.
    /// Returns `false` if the token no longer names a registered session.
    pub fn push_inbox(&self, token: &str, message: Message) -> bool {
        match self.registry.lock().lookup(token) {
            Some(session) => {
                session.inbox_msgs.push_back(message);
                true
            }
            None => false,
        }
    }

    /// Busy-polls for up to `EVAL_TIMEOUT` until `token`'s outbox carries an
    /// eval-terminal message, or the session disappears. Mirrors the
    /// original's `JULIA_TIMEOUT` wait loop: not an error if it times out,
    /// the response is just sent back empty-handed.
    pub fn wait_for_eval(&self, token: &str) {
        let deadline = Instant::now() + EVAL_TIMEOUT;
        loop {
            {
                let mut reg = self.registry.lock();
                match reg.lookup(token) {
                    Some(session) => {
                        if session.outbox_msgs.iter().any(|m| m.kind.is_eval_terminal()) {
                            return;
                        }
                    }
                    None => return,
                }
            }
            if Instant::now() >= deadline {
                return;
            }
            thread::sleep(EVAL_POLL_INTERVAL);
        }
    }

    /// Marks `token` as touched, folds any pending free-form stdout text
    /// into (or onto an existing trailing) `OUTPUT_OTHER` message, and
    /// drains the session's decoded outbox into `response`.
    pub fn drain_outbox(&self, token: &str, response: &mut Vec<Message>) {
        use crate::message::MessageKind;

        let mut reg = self.registry.lock();
        let Some(session) = reg.lookup(token) else {
            return;
        };
        session.touch();

        if !session.outbox_text.is_empty() && session.status == SessionStatus::Normal {
            let text = std::mem::take(&mut session.outbox_text);
            match session.outbox_msgs.back_mut() {
                Some(last) if last.kind == MessageKind::OutputOther => {
                    if let Some(arg) = last.args.first_mut() {
                        arg.extend_from_slice(text.as_bytes());
                    } else {
                        last.args.push(text.into_bytes());
                    }
                }
                _ => session
                    .outbox_msgs
                    .push_back(Message::new(MessageKind::OutputOther, vec![text.into_bytes()])),
            }
        }

        response.extend(session.outbox_msgs.drain(..));
    }

    /// Graceful shutdown: marks every session terminating, then force-kills
    /// and reaps every backend directly rather than waiting on the
    /// watchdog's next sweep. Called once, from the `SIGINT` handler.
    pub fn shutdown(&self) {
        let tokens = self.registry.lock().tokens();
        for token in tokens {
            if let Some(mut session) = self.registry.lock().remove(&token) {
                session.should_terminate = true;
                session.backend.kill_and_reap();
            }
        }
    }
}

struct WorkerFds {
    stdin: std::fs::File,
    stdout: std::fs::File,
    ctrl_in: std::net::TcpStream,
    ctrl_out: std::net::TcpStream,
}

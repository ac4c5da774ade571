//! The one process-wide watchdog thread. Runs a four-step sweep every
//! `WATCHDOG_INTERVAL`:
//!
//! 1. mark any session that has been idle past `SESSION_TIMEOUT`, or that a
//!    worker already flagged, as `TERMINATING`;
//! 2. signal every `TERMINATING` session's backend with `SIGKILL` (a
//!    non-blocking syscall, safe to issue while holding the registry lock
//!    since it never waits on the child);
//! 3. once a session's workers have both exited, remove it from the
//!    registry and reap it with a blocking `waitpid`, done only after the
//!    registry lock has been released;
//! 4. top up the idle pool and log the live session count.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tracing::info;

use crate::config::WATCHDOG_INTERVAL;
use crate::gateway::Gateway;
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;

pub fn spawn(gateway: Arc<Gateway>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        loop {
            sweep(&gateway.registry);
            gateway.top_up_idle_pool();
            thread::sleep(WATCHDOG_INTERVAL);
        }
    })
}

fn sweep(registry: &Arc<Mutex<SessionRegistry>>) {
    let mut reaped = Vec::new();

    {
        let mut reg = registry.lock();
        let now = Instant::now();

        reg.for_each(|session| {
            let timed_out = session.status == SessionStatus::Normal && !session.is_idle && session.is_expired(now);
            if session.status != SessionStatus::Terminating && (timed_out || session.should_terminate) {
                session.status = SessionStatus::Terminating;
                session.should_terminate = true;
            }
            if session.status == SessionStatus::Terminating {
                let _ = kill(Pid::from_raw(session.backend_pid()), Signal::SIGKILL);
            }
        });

        for token in reg.tokens() {
            let Some(session) = reg.lookup(&token) else { continue };
            if session.status == SessionStatus::Terminating && session.fully_drained() {
                if let Some(session) = reg.remove(&token) {
                    reaped.push(session);
                }
            }
        }

        info!(event = "session_count", count = reg.count());
    }

    for mut session in reaped {
        session.backend.kill_and_reap();
    }
}

use std::fs::File;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::codec::encode;
use crate::config::{WORKER_POLL_INTERVAL, WORKER_SELECT_BUDGET};
use crate::io_util::write_all_budgeted;
use crate::registry::SessionRegistry;

/// Drains a session's `inbox_text`/`inbox_msgs` queues onto its backend's
/// stdin pipe and control socket, forever, until the session is marked for
/// termination or disappears from the registry.
pub fn spawn(registry: Arc<Mutex<SessionRegistry>>, token: String, mut stdin: File, mut ctrl_sock: TcpStream) {
    thread::spawn(move || {
        loop {
            let (text, messages, terminate) = {
                let mut reg = registry.lock();
                let Some(session) = reg.lookup(&token) else {
                    return;
                };
                if session.should_terminate {
                    session.inbox_alive = false;
                    return;
                }
                let text = std::mem::take(&mut session.inbox_text);
                let messages: Vec<_> = session.inbox_msgs.drain(..).collect();
                (text, messages, session.should_terminate)
            };
            if terminate {
                return;
            }

            // A stdin write failure (including a transient backpressure
            // timeout) just drops the pending text and continues - the
            // backend will likely exit and get reaped by the watchdog on
            // its own terms (spec.md §4.4, §7.4). Only the control socket
            // propagates write errors into termination.
            let _ = write_all_budgeted(&mut stdin, text.as_bytes(), WORKER_SELECT_BUDGET);

            for message in &messages {
                let mut buf = Vec::new();
                encode(message, &mut buf);
                if write_all_budgeted(&mut ctrl_sock, &buf, WORKER_SELECT_BUDGET).is_err() {
                    mark_terminating(&registry, &token);
                    return;
                }
            }

            thread::sleep(WORKER_POLL_INTERVAL);
        }
    });
}

fn mark_terminating(registry: &Arc<Mutex<SessionRegistry>>, token: &str) {
    let mut reg = registry.lock();
    if let Some(session) = reg.lookup(token) {
        session.should_terminate = true;
        session.inbox_alive = false;
    }
}

use std::fs::File;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use crate::codec::{self, Decoded};
use crate::config::WORKER_POLL_INTERVAL;
use crate::io_util::{ReadOutcome, try_read_once};
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;

/// Pulls bytes off a session's stdout pipe (free-form text) and control
/// socket (framed protocol), pushing decoded results onto the session's
/// outbox queues until the session terminates.
pub fn spawn(registry: Arc<Mutex<SessionRegistry>>, token: String, mut stdout: File, mut ctrl_sock: TcpStream) {
    thread::spawn(move || {
        let mut text_scratch = [0u8; 4096];
        let mut raw_scratch = [0u8; 4096];

        loop {
            let terminate = {
                let mut reg = registry.lock();
                let Some(session) = reg.lookup(&token) else {
                    return;
                };
                session.should_terminate
            };
            if terminate {
                let mut reg = registry.lock();
                if let Some(session) = reg.lookup(&token) {
                    session.outbox_alive = false;
                }
                return;
            }

            let mut text_chunk = Vec::new();
            let text_outcome = try_read_once(&mut stdout, &mut text_scratch, &mut text_chunk);
            let mut raw_chunk = Vec::new();
            let raw_outcome = try_read_once(&mut ctrl_sock, &mut raw_scratch, &mut raw_chunk);

            let text_eof = matches!(text_outcome, Ok(ReadOutcome::Eof));
            let raw_eof = matches!(raw_outcome, Ok(ReadOutcome::Eof));
            let text_err = text_outcome.is_err();
            let raw_err = raw_outcome.is_err();

            if !text_chunk.is_empty() || !raw_chunk.is_empty() || text_eof || raw_eof || text_err || raw_err {
                let mut reg = registry.lock();
                if let Some(session) = reg.lookup(&token) {
                    if !text_chunk.is_empty() {
                        session.outbox_text.push_str(&String::from_utf8_lossy(&text_chunk));
                    }
                    if !raw_chunk.is_empty() {
                        session.outbox_raw.extend_from_slice(&raw_chunk);
                        drain_decoded(session);
                    }
                    if text_eof || raw_eof || text_err || raw_err {
                        session.should_terminate = true;
                        session.outbox_alive = false;
                    }
                }
                if text_eof || raw_eof || text_err || raw_err {
                    return;
                }
            }

            thread::sleep(WORKER_POLL_INTERVAL);
        }
    });
}

/// Decodes as many complete messages as are buffered in `outbox_raw`,
/// pushing each onto `outbox_msgs`. A malformed frame transitions the
/// session to `TERMINATING` rather than stalling forever.
fn drain_decoded(session: &mut crate::session::Session) {
    loop {
        match codec::decode(&session.outbox_raw) {
            Decoded::Message { message, consumed } => {
                session.outbox_msgs.push_back(message);
                session.outbox_raw.drain(..consumed);
            }
            Decoded::Incomplete => break,
            Decoded::Malformed => {
                session.status = SessionStatus::Terminating;
                session.should_terminate = true;
                break;
            }
        }
    }
}

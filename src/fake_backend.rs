//! A hidden backend stand-in used only by this crate's own integration
//! tests (invoked as `replgate --fake-backend`). It speaks exactly the
//! contract `spec.md` §6 describes for the real child process: print a
//! decimal port followed by `\n` on stdout, then exchange framed messages
//! on that loopback TCP port. It understands just enough of the message
//! set to drive the end-to-end scenarios in `spec.md` §8 without needing a
//! real language runtime in the test environment.

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};

use crate::codec::{self, Decoded};
use crate::message::{Message, MessageKind};

pub fn run() -> io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", 0))?;
    let port = listener.local_addr()?.port();

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{port}")?;
    handle.flush()?;

    let (mut socket, _addr) = listener.accept()?;
    serve(&mut socket)
}

fn serve(socket: &mut TcpStream) -> io::Result<()> {
    let mut raw = Vec::new();
    let mut scratch = [0u8; 4096];

    loop {
        let n = socket.read(&mut scratch)?;
        if n == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&scratch[..n]);

        loop {
            match codec::decode(&raw) {
                Decoded::Message { message, consumed } => {
                    raw.drain(..consumed);
                    if let Some(reply) = handle_message(&message) {
                        let mut buf = Vec::new();
                        codec::encode(&reply, &mut buf);
                        socket.write_all(&buf)?;
                    }
                }
                Decoded::Incomplete => break,
                Decoded::Malformed => return Ok(()),
            }
        }
    }
}

/// Trivial responder: evals are echoed back as the result, anything else
/// is ignored. Enough to exercise the synchronous eval-wait without
/// pretending to be an interpreter.
fn handle_message(message: &Message) -> Option<Message> {
    match message.kind {
        MessageKind::InputEval => {
            let echoed = message.arg_str(0).unwrap_or("").as_bytes().to_vec();
            Some(Message::new(MessageKind::OutputEvalResult, vec![echoed]))
        }
        _ => None,
    }
}

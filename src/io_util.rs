//! Small non-blocking I/O helpers shared by the inbox and outbox workers.
//!
//! Every handle these operate on has already been put in non-blocking mode
//! by `crate::child`; these helpers never sleep while holding a lock, and
//! callers always perform them after the registry guard has been dropped.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::config::WORKER_POLL_INTERVAL;

/// Result of a single non-blocking read attempt.
pub enum ReadOutcome {
    /// Got at least one byte.
    Data(usize),
    /// Nothing available right now.
    WouldBlock,
    /// The peer closed its end.
    Eof,
}

/// Attempts one non-blocking read into `scratch`, appending whatever is
/// read onto `out`.
pub fn try_read_once<R: Read>(reader: &mut R, scratch: &mut [u8], out: &mut Vec<u8>) -> io::Result<ReadOutcome> {
    match reader.read(scratch) {
        Ok(0) => Ok(ReadOutcome::Eof),
        Ok(n) => {
            out.extend_from_slice(&scratch[..n]);
            Ok(ReadOutcome::Data(n))
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::WouldBlock),
        Err(e) => Err(e),
    }
}

/// Writes all of `data`, retrying on `WouldBlock` until `budget` elapses.
/// Mirrors the original's budgeted `select()` + `write()` pair for a pipe
/// that does not support a socket-style send timeout.
pub fn write_all_budgeted<W: Write>(writer: &mut W, data: &[u8], budget: Duration) -> io::Result<()> {
    let deadline = Instant::now() + budget;
    let mut written = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "write budget exceeded"));
                }
                std::thread::sleep(WORKER_POLL_INTERVAL);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

use std::fs::File;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::{AsRawFd, FromRawFd};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::waitpid;
use nix::unistd::{Pid, dup};

use crate::config::WORKER_POLL_INTERVAL;
use crate::error::{GatewayError, Result};

/// A spawned backend process plus the handles a session needs to drive it:
/// a plain-text pipe pair for free-form output and a framed TCP control
/// socket for structured messages.
///
/// `stdin`/`stdout` and the control socket are all left in non-blocking
/// mode: every read/write against them happens under the worker-poll
/// budget so no thread ever blocks while holding the registry lock.
pub struct BackendHandle {
    pub pid: u32,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub ctrl_sock: TcpStream,
    child: Child,
}

impl BackendHandle {
    /// Sends `SIGKILL` and reaps the process. Safe to call more than once;
    /// a process that already exited is simply waited on again.
    pub fn kill_and_reap(&mut self) {
        let pid = Pid::from_raw(self.pid as i32);
        let _ = kill(pid, Signal::SIGKILL);
        let _ = waitpid(pid, None);
        let _ = self.child.wait();
    }

    /// Duplicates the stdin fd for a worker thread to own independently of
    /// the registry lock. The duplicate inherits the non-blocking flag.
    pub fn dup_stdin(&self) -> Result<File> {
        let fd = dup(self.stdin.as_raw_fd()).map_err(io_err)?;
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    pub fn dup_stdout(&self) -> Result<File> {
        let fd = dup(self.stdout.as_raw_fd()).map_err(io_err)?;
        Ok(unsafe { File::from_raw_fd(fd) })
    }

    pub fn dup_ctrl_sock(&self) -> Result<TcpStream> {
        let fd = dup(self.ctrl_sock.as_raw_fd()).map_err(io_err)?;
        Ok(unsafe { TcpStream::from_raw_fd(fd) })
    }
}

fn set_nonblocking<T: AsRawFd>(handle: &T) -> Result<()> {
    let fd = handle.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(io_err)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(io_err)?;
    Ok(())
}

fn io_err(e: nix::Error) -> GatewayError {
    GatewayError::Io(std::io::Error::from(e))
}

/// Spawns the backend program, waits for its port-announcement line on
/// stdout, and connects the loopback control socket.
///
/// The backend contract: write a single `\n`-terminated decimal port number
/// to stdout before doing anything else, then listen on that loopback TCP
/// port for the framed protocol. Anything the backend writes to stdout
/// after the handshake is free-form text forwarded to clients as
/// `OUTPUT_OTHER` messages, not framed protocol bytes.
pub fn spawn_backend(program: &str, args: &[String], handshake_timeout: Duration) -> Result<BackendHandle> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(GatewayError::Spawn)?;

    let pid = child.id();
    let mut stdout = child.stdout.take().expect("stdout was piped");
    let stdin = child.stdin.take().expect("stdin was piped");

    set_nonblocking(&stdout)?;
    set_nonblocking(&stdin)?;

    let port = match read_handshake_line(&mut stdout, handshake_timeout) {
        Ok(port) => port,
        Err(err) => {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            let _ = child.wait();
            return Err(err);
        }
    };

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let ctrl_sock = match TcpStream::connect_timeout(&addr, handshake_timeout) {
        Ok(sock) => sock,
        Err(source) => {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
            let _ = child.wait();
            return Err(GatewayError::ControlConnect(source));
        }
    };
    set_nonblocking(&ctrl_sock)?;

    Ok(BackendHandle {
        pid,
        stdin,
        stdout,
        ctrl_sock,
        child,
    })
}

/// Reads a single `\n`-terminated line from `stdout` under a wall-clock
/// deadline, one non-blocking read at a time. `stdout` must already be in
/// non-blocking mode.
fn read_handshake_line(stdout: &mut ChildStdout, timeout: Duration) -> Result<u16> {
    use std::io::Read;

    let deadline = Instant::now() + timeout;
    let mut line = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        match stdout.read(&mut byte) {
            Ok(0) => return Err(GatewayError::HandshakeTimeout),
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(GatewayError::HandshakeTimeout);
                }
                std::thread::sleep(WORKER_POLL_INTERVAL);
            }
            Err(e) => return Err(GatewayError::Io(e)),
        }
    }

    let text = String::from_utf8_lossy(&line).trim().to_string();
    text.parse::<u16>()
        .map_err(|_| GatewayError::MalformedPortAnnouncement(text))
}

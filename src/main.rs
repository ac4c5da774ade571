mod child;
mod cli;
mod codec;
mod config;
mod error;
mod fake_backend;
mod gateway;
mod http;
mod io_util;
mod logging;
mod message;
mod registry;
mod session;
mod watchdog;
mod workers;

use std::io::Write;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use nix::sys::signal::{self, SigHandler, Signal};
use once_cell::sync::Lazy;
use signal_hook::consts::SIGINT;
use tracing::{error, info, warn};

use crate::cli::Args;
use crate::config::Config;
use crate::gateway::Gateway;

/// Set by the `SIGINT` handler registered in `main`; the accept loop polls
/// it between connections so shutdown can run outside signal-handler
/// context.
static SHUTDOWN: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.fake_backend {
        return fake_backend::run().map_err(Into::into);
    }

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(program) = &args.backend_program {
        config.backend_program = program.clone();
    }
    if !args.backend_args.is_empty() {
        config.backend_args = args.backend_args.clone();
    }

    logging::init(&config.log_level);
    install_signal_handlers()?;

    let gateway = Arc::new(Gateway::new(config));
    watchdog::spawn(gateway.clone());

    run_accept_loop(gateway.clone(), args.port)?;

    info!(event = "shutdown", "closing sessions and exiting");
    gateway.shutdown();
    Ok(())
}

/// `SIGPIPE` is ignored process-wide so a dead backend's broken pipe
/// surfaces as a normal I/O error on the next read/write instead of
/// killing the gateway. `SIGINT` flips `SHUTDOWN`, which the accept loop
/// observes between connections.
fn install_signal_handlers() -> anyhow::Result<()> {
    unsafe {
        signal::signal(Signal::SIGPIPE, SigHandler::SigIgn)?;
    }
    signal_hook::flag::register(SIGINT, Arc::clone(&SHUTDOWN))?;
    Ok(())
}

fn run_accept_loop(gateway: Arc<Gateway>, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    listener.set_nonblocking(true)?;
    info!(event = "listening", port, "gateway accepting SCGI connections");

    while !SHUTDOWN.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _addr)) => {
                let gateway = gateway.clone();
                thread::spawn(move || serve_connection(&gateway, stream));
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
            Err(e) => {
                error!(error = %e, "accept failed");
                thread::sleep(ACCEPT_POLL_INTERVAL);
            }
        }
    }
    Ok(())
}

fn serve_connection(gateway: &Gateway, mut stream: std::net::TcpStream) {
    stream.set_nonblocking(false).ok();
    let request = match http::scgi::read_request(&mut stream) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "failed to read SCGI request");
            return;
        }
    };

    let response = http::dispatcher::handle(gateway, &request);
    if let Err(e) = stream.write_all(response.as_bytes()) {
        warn!(error = %e, "failed to write SCGI response");
    }
}

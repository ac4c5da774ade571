use std::path::PathBuf;

use clap::Parser;

/// Multi-tenant SCGI gateway fronting interactive child-process backends.
#[derive(Debug, Parser)]
#[command(name = "replgate")]
pub struct Args {
    /// Port to listen for SCGI requests on.
    #[arg(short = 'p', long, default_value_t = 1441)]
    pub port: u16,

    /// Path to an optional project TOML config file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Override the backend program to spawn per session.
    #[arg(long)]
    pub backend_program: Option<String>,

    /// Append an argument to the backend program's argv. Repeatable.
    #[arg(long = "backend-arg")]
    pub backend_args: Vec<String>,

    /// Run as a minimal stand-in backend instead of the gateway itself.
    /// Used by this crate's own integration tests in place of a real
    /// language runtime; not part of the public interface.
    #[arg(long, hide = true)]
    pub fake_backend: bool,
}

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Subcommand};
use vhalclient_transport::Endpoint;

use crate::exit::{CliError, CliResult};
use crate::output::OutputFormat;

pub mod emulate;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Replay a file to the VHAL as data frames while it asks for them.
    Stream(StreamArgs),
    /// Play the VHAL side: request frames from one client, then close.
    Emulate(EmulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Stream(args) => stream::run(args, format),
        Command::Emulate(args) => emulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// File whose bytes are streamed, restarting from the top at EOF.
    pub filename: PathBuf,
    /// VHAL endpoint: a socket path, `unix:PATH` or `tcp://HOST[:PORT]`.
    pub endpoint: Endpoint,
    /// Bytes per data frame.
    #[arg(long, default_value_t = 4096)]
    pub chunk_size: usize,
    /// Frames per second.
    #[arg(long, default_value_t = 30)]
    pub fps: u32,
}

#[derive(Args, Debug)]
pub struct EmulateArgs {
    /// Socket path to bind.
    pub socket_path: PathBuf,
    /// Data frames to read before sending close.
    #[arg(long, default_value_t = 30)]
    pub frames: u64,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Flag raised by Ctrl-C. Commands poll it between blocking steps.
pub(crate) fn install_interrupt_handler() -> CliResult<Arc<AtomicBool>> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| CliError::failure(format!("signal handler setup failed: {err}")))?;
    Ok(interrupted)
}

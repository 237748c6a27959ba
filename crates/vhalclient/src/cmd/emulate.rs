use std::io::{ErrorKind, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use vhalclient_frame::{Command, ControlMessage, FrameConfig, FrameError, FrameReader};
use vhalclient_transport::{SocketStream, TransportError, UnixSocketListener};

use crate::cmd::{install_interrupt_handler, EmulateArgs};
use crate::exit::{frame_error, io_error, transport_error, CliError, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{print_summary, OutputFormat, Summary};

const ACCEPT_POLL: Duration = Duration::from_millis(25);
const READ_POLL: Duration = Duration::from_millis(100);
/// How long the client gets to disconnect after `close`.
const HANGUP_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run(args: EmulateArgs, format: OutputFormat) -> CliResult<i32> {
    let interrupted = install_interrupt_handler()?;
    let listener = UnixSocketListener::bind(&args.socket_path)
        .map_err(|err| transport_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;
    info!(socket = %args.socket_path.display(), "waiting for a client");

    let mut summary = EmulateSummary::new(&args);
    let started = Instant::now();

    let Some(stream) = accept(&listener, &interrupted)? else {
        return finish(summary, started, Outcome::Interrupted, format);
    };
    summary.client_pid = stream.peer_credentials().map(|(_, _, pid)| pid);
    info!(client_pid = ?summary.client_pid, "client connected");

    let config = FrameConfig {
        read_timeout: Some(READ_POLL),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config_socket(stream, config)
        .map_err(|err| frame_error("socket setup failed", err))?;

    send_command(reader.get_ref(), Command::Open)?;
    info!(frames = args.frames, "sent open");

    while summary.frames_received < args.frames {
        if interrupted.load(Ordering::SeqCst) {
            return finish(summary, started, Outcome::Interrupted, format);
        }
        match reader.read_frame() {
            Ok(frame) => summary.record(frame.len()),
            Err(err) if is_poll_timeout(&err) => {}
            Err(FrameError::ConnectionClosed) => {
                warn!(received = summary.frames_received, "client hung up before close");
                return finish(summary, started, Outcome::ClientHungUpEarly, format);
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    }

    send_command(reader.get_ref(), Command::Close)?;
    info!(received = summary.frames_received, "sent close");

    // Frames already in flight when close was sent are counted separately.
    let deadline = Instant::now() + HANGUP_TIMEOUT;
    let outcome = loop {
        if interrupted.load(Ordering::SeqCst) {
            break Outcome::Interrupted;
        }
        match reader.read_frame() {
            Ok(frame) => {
                summary.trailing_frames += 1;
                summary.bytes_received += frame.len() as u64;
            }
            Err(FrameError::ConnectionClosed) => {
                summary.client_hung_up = true;
                break Outcome::Completed;
            }
            Err(err) if is_poll_timeout(&err) => {
                if Instant::now() >= deadline {
                    warn!(
                        timeout = ?HANGUP_TIMEOUT,
                        partial_bytes = reader.buffered(),
                        "client still connected after close"
                    );
                    break Outcome::Completed;
                }
            }
            // A reset after close still ends the session.
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::ConnectionReset => {
                summary.client_hung_up = true;
                break Outcome::Completed;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        }
    };

    finish(summary, started, outcome, format)
}

/// Accept one client, checking for Ctrl-C between attempts.
fn accept(listener: &UnixSocketListener, interrupted: &AtomicBool) -> CliResult<Option<SocketStream>> {
    while !interrupted.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(stream) => return Ok(Some(stream)),
            Err(TransportError::Accept(err)) if err.kind() == ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => return Err(transport_error("accept failed", err)),
        }
    }
    Ok(None)
}

fn send_command(mut stream: &SocketStream, command: Command) -> CliResult<()> {
    debug!(%command, "sending control message");
    stream
        .write_all(&ControlMessage::new(command).encode())
        .map_err(|err| io_error(&format!("failed to send {command}"), err))
}

fn is_poll_timeout(err: &FrameError) -> bool {
    matches!(
        err,
        FrameError::Io(io) if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
    )
}

fn finish(
    mut summary: EmulateSummary,
    started: Instant,
    outcome: Outcome,
    format: OutputFormat,
) -> CliResult<i32> {
    summary.outcome = outcome.label();
    summary.duration_ms = started.elapsed().as_millis();
    print_summary(&summary, format);

    match outcome {
        Outcome::Completed => Ok(SUCCESS),
        Outcome::Interrupted => Ok(INTERRUPTED),
        Outcome::ClientHungUpEarly => Err(CliError::failure(format!(
            "client disconnected after {} of {} frames",
            summary.frames_received, summary.frames_requested
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Interrupted,
    ClientHungUpEarly,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Interrupted => "interrupted",
            Self::ClientHungUpEarly => "client-hung-up-early",
        }
    }
}

#[derive(Debug, Serialize)]
struct EmulateSummary {
    socket_path: String,
    outcome: &'static str,
    client_pid: Option<u32>,
    frames_requested: u64,
    frames_received: u64,
    trailing_frames: u64,
    bytes_received: u64,
    min_frame_size: Option<usize>,
    max_frame_size: Option<usize>,
    client_hung_up: bool,
    duration_ms: u128,
}

impl EmulateSummary {
    fn new(args: &EmulateArgs) -> Self {
        Self {
            socket_path: args.socket_path.display().to_string(),
            outcome: "running",
            client_pid: None,
            frames_requested: args.frames,
            frames_received: 0,
            trailing_frames: 0,
            bytes_received: 0,
            min_frame_size: None,
            max_frame_size: None,
            client_hung_up: false,
            duration_ms: 0,
        }
    }

    fn record(&mut self, size: usize) {
        self.frames_received += 1;
        self.bytes_received += size as u64;
        self.min_frame_size = Some(self.min_frame_size.map_or(size, |min| min.min(size)));
        self.max_frame_size = Some(self.max_frame_size.map_or(size, |max| max.max(size)));
    }
}

impl Summary for EmulateSummary {
    fn kind(&self) -> &'static str {
        "emulate"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        let opt = |value: Option<usize>| value.map_or_else(|| "-".to_string(), |v| v.to_string());
        vec![
            ("socket_path", self.socket_path.clone()),
            ("outcome", self.outcome.to_string()),
            (
                "client_pid",
                self.client_pid
                    .map_or_else(|| "-".to_string(), |pid| pid.to_string()),
            ),
            ("frames_requested", self.frames_requested.to_string()),
            ("frames_received", self.frames_received.to_string()),
            ("trailing_frames", self.trailing_frames.to_string()),
            ("bytes_received", self.bytes_received.to_string()),
            ("min_frame_size", opt(self.min_frame_size)),
            ("max_frame_size", opt(self.max_frame_size)),
            ("client_hung_up", self.client_hung_up.to_string()),
            ("duration_ms", self.duration_ms.to_string()),
        ]
    }
}

use std::fs::File;
use std::io::{ErrorKind, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, trace, warn};
use vhalclient_frame::{Command, ControlMessage, DEFAULT_MAX_PAYLOAD};
use vhalclient_sink::{EngineConfig, VideoSink};
use vhalclient_transport::StreamClient;

use crate::cmd::{install_interrupt_handler, StreamArgs};
use crate::exit::{io_error, sink_error, CliError, CliResult, INTERRUPTED, SUCCESS};
use crate::output::{print_summary, OutputFormat, Summary};

/// How often the command loop checks for Ctrl-C and a failed producer.
const EVENT_POLL: Duration = Duration::from_millis(100);

pub fn run(args: StreamArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk_size == 0 || args.chunk_size > DEFAULT_MAX_PAYLOAD {
        return Err(CliError::usage(format!(
            "--chunk-size must be between 1 and {DEFAULT_MAX_PAYLOAD}"
        )));
    }
    if args.fps == 0 {
        return Err(CliError::usage("--fps must be at least 1"));
    }

    let mut source = Some(ChunkSource::open(&args.filename, args.chunk_size)?);
    let interval = Duration::from_secs(1) / args.fps;
    let interrupted = install_interrupt_handler()?;

    let (tx, commands) = mpsc::channel();
    let sink = VideoSink::with_callback(
        StreamClient::new(args.endpoint.clone()),
        EngineConfig::default(),
        move |msg: &ControlMessage| {
            let _ = tx.send(msg.command);
        },
    )
    .map_err(|err| sink_error("failed to start video sink", err))?;
    let sink = Arc::new(sink);
    info!(
        endpoint = %args.endpoint,
        file = %args.filename.display(),
        chunk_size = args.chunk_size,
        fps = args.fps,
        "waiting for VHAL to open the stream"
    );

    let started = Instant::now();
    let mut summary = StreamSummary::new(&args);
    let mut producer: Option<Producer> = None;

    let outcome = loop {
        if interrupted.load(Ordering::SeqCst) {
            info!("interrupted");
            break Outcome::Interrupted;
        }
        if producer.as_ref().is_some_and(Producer::is_finished) {
            // Only a failed send or read ends the producer on its own.
            break Outcome::ProducerStopped;
        }

        match commands.recv_timeout(EVENT_POLL) {
            Ok(Command::Open) => {
                summary.opens += 1;
                match source.take() {
                    Some(source) => {
                        info!("VHAL opened the stream");
                        producer = Some(Producer::spawn(Arc::clone(&sink), source, interval)?);
                    }
                    None => debug!("open while already streaming; ignored"),
                }
            }
            Ok(Command::Close) => {
                info!("VHAL closed the stream");
                break Outcome::Closed;
            }
            Ok(Command::Unknown(code)) => {
                error!(code, "unknown command from VHAL");
                break Outcome::UnknownCommand(code);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                break Outcome::ProducerStopped;
            }
        }
    };

    let produced = producer.map(Producer::stop).transpose();
    summary.connects = sink.stats().connects;
    summary.duration_ms = started.elapsed().as_millis();
    drop(sink);

    let produced = match produced {
        Ok(produced) => produced.unwrap_or_default(),
        Err(err) => {
            summary.outcome = "send-failed";
            print_summary(&summary, format);
            return Err(err);
        }
    };
    summary.frames_sent = produced.frames;
    summary.bytes_sent = produced.bytes;
    summary.file_restarts = produced.restarts;
    summary.outcome = outcome.label();
    print_summary(&summary, format);

    match outcome {
        Outcome::Closed => Ok(SUCCESS),
        Outcome::Interrupted => Ok(INTERRUPTED),
        Outcome::UnknownCommand(code) => {
            Err(CliError::failure(format!("unknown command {code} from VHAL")))
        }
        Outcome::ProducerStopped => Err(CliError::failure("producer stopped unexpectedly")),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Closed,
    Interrupted,
    UnknownCommand(u32),
    ProducerStopped,
}

impl Outcome {
    fn label(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Interrupted => "interrupted",
            Self::UnknownCommand(_) => "unknown-command",
            Self::ProducerStopped => "producer-stopped",
        }
    }
}

#[derive(Debug, Serialize)]
struct StreamSummary {
    endpoint: String,
    filename: String,
    outcome: &'static str,
    opens: u64,
    frames_sent: u64,
    bytes_sent: u64,
    file_restarts: u64,
    connects: u64,
    duration_ms: u128,
}

impl StreamSummary {
    fn new(args: &StreamArgs) -> Self {
        Self {
            endpoint: args.endpoint.to_string(),
            filename: args.filename.display().to_string(),
            outcome: "running",
            opens: 0,
            frames_sent: 0,
            bytes_sent: 0,
            file_restarts: 0,
            connects: 0,
            duration_ms: 0,
        }
    }
}

impl Summary for StreamSummary {
    fn kind(&self) -> &'static str {
        "stream"
    }

    fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("endpoint", self.endpoint.clone()),
            ("filename", self.filename.clone()),
            ("outcome", self.outcome.to_string()),
            ("opens", self.opens.to_string()),
            ("frames_sent", self.frames_sent.to_string()),
            ("bytes_sent", self.bytes_sent.to_string()),
            ("file_restarts", self.file_restarts.to_string()),
            ("connects", self.connects.to_string()),
            ("duration_ms", self.duration_ms.to_string()),
        ]
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Produced {
    frames: u64,
    bytes: u64,
    restarts: u64,
}

/// Thread writing one chunk per interval until told to stop.
struct Producer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<CliResult<Produced>>,
}

impl Producer {
    fn spawn(sink: Arc<VideoSink<StreamClient>>, source: ChunkSource, interval: Duration) -> CliResult<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("vhal-producer".to_string())
            .spawn({
                let stop = Arc::clone(&stop);
                move || produce(&sink, source, interval, &stop)
            })
            .map_err(|err| io_error("failed to start producer", err))?;
        Ok(Self { stop, handle })
    }

    fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    fn stop(self) -> CliResult<Produced> {
        self.stop.store(true, Ordering::SeqCst);
        self.handle
            .join()
            .unwrap_or_else(|_| Err(CliError::failure("producer thread panicked")))
    }
}

fn produce(
    sink: &VideoSink<StreamClient>,
    mut source: ChunkSource,
    interval: Duration,
    stop: &AtomicBool,
) -> CliResult<Produced> {
    let mut produced = Produced::default();
    let mut next = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        let chunk = source.next_chunk()?;
        let sent = sink.write_packet(chunk).map_err(|err| {
            warn!(error = %err, "send failed");
            sink_error("send failed", err)
        })?;
        if sent != chunk.len() {
            return Err(CliError::failure(format!(
                "send failed: short write ({sent} of {} bytes)",
                chunk.len()
            )));
        }
        produced.frames += 1;
        produced.bytes += sent as u64;
        trace!(frame = produced.frames, size = sent, "frame sent");

        next += interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }

    produced.restarts = source.restarts;
    debug!(frames = produced.frames, bytes = produced.bytes, "producer stopped");
    Ok(produced)
}

/// Fixed-size chunks of a file, wrapping to the start at EOF.
struct ChunkSource {
    path: PathBuf,
    file: File,
    buf: Vec<u8>,
    restarts: u64,
}

impl ChunkSource {
    fn open(path: &Path, chunk_size: usize) -> CliResult<Self> {
        let context = format!("cannot read {}", path.display());
        let file = File::open(path).map_err(|err| io_error(&context, err))?;
        let len = file
            .metadata()
            .map_err(|err| io_error(&context, err))?
            .len();
        if len == 0 {
            return Err(CliError::failure(format!("{context}: file is empty")));
        }
        Ok(Self {
            path: path.to_path_buf(),
            file,
            buf: vec![0; chunk_size],
            restarts: 0,
        })
    }

    /// Next chunk, at most `chunk_size` bytes. Only the chunk before EOF is short.
    fn next_chunk(&mut self) -> CliResult<&[u8]> {
        let mut filled = self.fill()?;
        if filled == 0 {
            self.file
                .rewind()
                .map_err(|err| io_error(&format!("cannot rewind {}", self.path.display()), err))?;
            self.restarts += 1;
            debug!(restarts = self.restarts, "input exhausted; starting over");
            filled = self.fill()?;
            if filled == 0 {
                return Err(CliError::failure(format!(
                    "{} became empty",
                    self.path.display()
                )));
            }
        }
        Ok(&self.buf[..filled])
    }

    fn fill(&mut self) -> CliResult<usize> {
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.file.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(err) => {
                    return Err(io_error(&format!("cannot read {}", self.path.display()), err))
                }
            }
        }
        Ok(filled)
    }
}

//! Minimal video producer: streams a synthetic frame while the VHAL asks for it.
//!
//! Run with:
//!   cargo run --example video-sink -- /tmp/vhal-camera.sock
//!
//! In another terminal, play the VHAL side:
//!   cargo run --features cli -- emulate /tmp/vhal-camera.sock --frames 60

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use vhalclient::frame::Command;
use vhalclient::VideoSink;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/vhal-camera.sock".to_string());

    let sink = Arc::new(VideoSink::connect_unix(&path)?);
    let (tx, commands) = mpsc::channel();
    sink.register_callback(move |msg| {
        let _ = tx.send(msg.command);
    });
    eprintln!("Waiting for the VHAL on {path}");

    let stop = Arc::new(AtomicBool::new(true));
    let mut producer = None;

    for command in commands {
        match command {
            Command::Open if producer.is_none() => {
                eprintln!("VHAL opened the stream");
                stop.store(false, Ordering::SeqCst);
                let sink = Arc::clone(&sink);
                let stop = Arc::clone(&stop);
                producer = Some(thread::spawn(move || {
                    let frame = vec![0x80u8; 4096];
                    while !stop.load(Ordering::SeqCst) {
                        if let Err(err) = sink.write_packet(&frame) {
                            eprintln!("write failed: {err}");
                            break;
                        }
                        thread::sleep(Duration::from_millis(33));
                    }
                }));
            }
            Command::Open => {}
            Command::Close => {
                eprintln!("VHAL closed the stream");
                stop.store(true, Ordering::SeqCst);
                if let Some(handle) = producer.take() {
                    let _ = handle.join();
                }
                break;
            }
            Command::Unknown(code) => eprintln!("ignoring unknown command {code}"),
        }
    }

    Ok(())
}

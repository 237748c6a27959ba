//! Minimal audio reader: prints how many playback bytes the VHAL sends.
//!
//! Run with:
//!   cargo run --example audio-source -- 127.0.0.1 8768

use std::time::Duration;

use vhalclient::{AudioSource, TcpConnectionInfo};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let ip_addr = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = args.next().map(|p| p.parse::<u16>()).transpose()?.unwrap_or(0);

    let source = AudioSource::new(TcpConnectionInfo::new(ip_addr, port), 0)?;
    eprintln!("Reading from {}", source.endpoint());

    let mut buf = vec![0u8; 4096];
    let mut total = 0usize;
    loop {
        if !source.wait_until_connected(Duration::from_secs(1)) {
            continue;
        }
        match source.read_data_packet(&mut buf) {
            Ok(0) => eprintln!("server hung up after {total} bytes; reconnecting"),
            Ok(n) => {
                total += n;
                eprintln!("received {n} bytes ({total} total)");
            }
            Err(err) => eprintln!("read failed: {err}"),
        }
    }
}

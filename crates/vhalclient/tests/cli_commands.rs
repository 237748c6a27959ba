#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use vhalclient_frame::{ControlMessage, FrameConfig, FrameReader};
use vhalclient_transport::{SocketStream, TransportError, UnixSocketListener};

const WAIT: Duration = Duration::from_secs(10);

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/vhalcli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn patterned_file(dir: &Path, len: usize) -> (PathBuf, Vec<u8>) {
    let contents: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    let path = dir.join("input.bin");
    std::fs::write(&path, &contents).expect("input file should be writable");
    (path, contents)
}

fn vhalclient() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vhalclient"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn spawn_stream(file: &Path, sock: &Path, extra: &[&str]) -> Child {
    vhalclient()
        .arg("--format")
        .arg("json")
        .arg("stream")
        .arg(file)
        .arg(sock)
        .args(extra)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("stream command should start")
}

fn accept_within(listener: &UnixSocketListener, timeout: Duration) -> SocketStream {
    listener
        .set_nonblocking(true)
        .expect("listener should go nonblocking");
    let start = Instant::now();
    loop {
        match listener.accept() {
            Ok(stream) => return stream,
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                assert!(start.elapsed() < timeout, "client never connected");
                thread::sleep(Duration::from_millis(10));
            }
            Err(err) => panic!("accept failed: {err}"),
        }
    }
}

fn send(mut stream: &SocketStream, msg: ControlMessage) {
    stream
        .write_all(&msg.encode())
        .expect("control message should send");
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Output {
    let start = Instant::now();
    while child.try_wait().expect("child should be pollable").is_none() {
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("command did not exit within {timeout:?}");
        }
        thread::sleep(Duration::from_millis(20));
    }
    child.wait_with_output().expect("output should be collected")
}

#[test]
fn stream_replays_file_between_open_and_close() {
    let dir = unique_temp_dir("stream");
    let sock_path = dir.join("camera.sock");
    let (file, contents) = patterned_file(&dir, 10_000);
    let listener = UnixSocketListener::bind(&sock_path).expect("bind should succeed");

    let child = spawn_stream(&file, &sock_path, &["--fps", "200"]);
    let stream = accept_within(&listener, WAIT);
    let config = FrameConfig {
        read_timeout: Some(WAIT),
        ..FrameConfig::default()
    };
    let mut reader = FrameReader::with_config_socket(stream, config).expect("reader should build");

    send(reader.get_ref(), ControlMessage::open());

    // 10_000 bytes in 4096-byte chunks: two full chunks, a short one, then wrap.
    let expected: [&[u8]; 4] = [
        &contents[..4096],
        &contents[4096..8192],
        &contents[8192..],
        &contents[..4096],
    ];
    for want in expected {
        let frame = reader.read_frame().expect("frame should arrive");
        assert_eq!(frame.as_ref(), want);
    }

    send(reader.get_ref(), ControlMessage::close());
    let output = wait_with_timeout(child, WAIT);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"outcome\":\"closed\""));
    assert!(stdout.contains("\"opens\":1"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stream_reaches_tcp_endpoint() {
    let dir = unique_temp_dir("tcp");
    let (file, contents) = patterned_file(&dir, 100);
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
    let port = listener.local_addr().expect("listener has an address").port();

    let child = vhalclient()
        .arg("--format")
        .arg("json")
        .arg("stream")
        .arg(&file)
        .arg(format!("tcp://127.0.0.1:{port}"))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("stream command should start");
    let (mut peer, _) = listener.accept().expect("client should connect");
    peer.set_read_timeout(Some(WAIT)).expect("timeout should apply");

    peer.write_all(&ControlMessage::open().encode()).expect("control message should send");
    let mut reader = FrameReader::new(&peer);
    let frame = reader.read_frame().expect("frame should arrive");
    assert_eq!(frame.as_ref(), &contents[..]);

    peer.write_all(&ControlMessage::close().encode()).expect("control message should send");
    let output = wait_with_timeout(child, WAIT);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains(&format!("\"endpoint\":\"tcp://127.0.0.1:{port}\"")));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stream_exits_1_on_unknown_command() {
    let dir = unique_temp_dir("unknown");
    let sock_path = dir.join("camera.sock");
    let (file, _) = patterned_file(&dir, 64);
    let listener = UnixSocketListener::bind(&sock_path).expect("bind should succeed");

    let child = spawn_stream(&file, &sock_path, &[]);
    let stream = accept_within(&listener, WAIT);
    send(&stream, ControlMessage::new(vhalclient_frame::Command::Unknown(7)));

    let output = wait_with_timeout(child, WAIT);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown command 7"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn stream_exits_1_when_file_is_missing() {
    let dir = unique_temp_dir("missing");
    let output = vhalclient()
        .arg("stream")
        .arg(dir.join("nope.bin"))
        .arg(dir.join("camera.sock"))
        .output()
        .expect("stream should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot read"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn missing_arguments_exit_1() {
    let output = vhalclient()
        .arg("stream")
        .output()
        .expect("stream should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(!output.stderr.is_empty());
}

#[test]
fn zero_fps_is_a_usage_error() {
    let dir = unique_temp_dir("fps");
    let (file, _) = patterned_file(&dir, 64);
    let output = vhalclient()
        .arg("stream")
        .arg(&file)
        .arg(dir.join("camera.sock"))
        .arg("--fps")
        .arg("0")
        .output()
        .expect("stream should run");

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("--fps"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn emulator_drives_stream_end_to_end() {
    let dir = unique_temp_dir("e2e");
    let sock_path = dir.join("camera.sock");
    let (file, _) = patterned_file(&dir, 4096 * 3);

    let emulator = vhalclient()
        .arg("--format")
        .arg("json")
        .arg("emulate")
        .arg(&sock_path)
        .arg("--frames")
        .arg("5")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("emulate command should start");

    // The client retries until the emulator binds, so no ordering is needed.
    let client = spawn_stream(&file, &sock_path, &["--fps", "100"]);

    let client_out = wait_with_timeout(client, WAIT);
    let emulator_out = wait_with_timeout(emulator, WAIT);

    assert!(
        client_out.status.success(),
        "stream stderr: {}",
        String::from_utf8_lossy(&client_out.stderr)
    );
    assert!(
        emulator_out.status.success(),
        "emulate stderr: {}",
        String::from_utf8_lossy(&emulator_out.stderr)
    );

    let report = String::from_utf8_lossy(&emulator_out.stdout);
    assert!(report.contains("\"frames_received\":5"));
    assert!(report.contains("\"client_hung_up\":true"));
    assert!(report.contains("\"max_frame_size\":4096"));
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_package_version() {
    let output = vhalclient()
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("vhalclient {}", env!("CARGO_PKG_VERSION")));
}

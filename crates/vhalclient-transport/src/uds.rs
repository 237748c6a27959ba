use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::connection::ConnectionSlot;
use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
use crate::traits::{SocketStream, Transport};

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

/// Client side of a local-domain stream socket (the VHAL video channel).
pub struct UnixStreamClient {
    path: PathBuf,
    endpoint: Endpoint,
    slot: ConnectionSlot,
}

impl UnixStreamClient {
    /// Create a disconnected client for the socket at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            endpoint: Endpoint::local(path.clone()),
            path,
            slot: ConnectionSlot::default(),
        }
    }

    /// The socket path this client connects to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-stream"
    }
}

impl Transport for UnixStreamClient {
    fn connect(&self) -> Result<()> {
        let path = &self.path;
        check_path_len(path)?;
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            endpoint: self.endpoint.clone(),
            source,
        })?;
        debug!(?path, "connected to unix stream socket");
        self.slot.install(SocketStream::from_unix(stream));
        Ok(())
    }

    fn send(&self, buf: &[u8]) -> Result<usize> {
        self.slot.send(buf)
    }

    fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        self.slot.recv(buf)
    }

    fn close(&self) {
        self.slot.close();
    }

    fn is_connected(&self) -> bool {
        self.slot.is_connected()
    }

    fn native_handle(&self) -> Option<std::os::fd::RawFd> {
        self.slot.native_handle()
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl std::fmt::Debug for UnixStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixStreamClient")
            .field("path", &self.path())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Listening local-domain socket, the VHAL side of the video channel.
///
/// Used by the emulator and by tests. The socket file is removed on drop
/// unless it was replaced while the listener was alive.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
}

impl UnixSocketListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// Bind and listen on `path`.
    ///
    /// If the file already exists and is a socket, it is removed first (stale
    /// socket cleanup). Any other existing file is left alone and reported.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind and listen on `path` with an explicit permission mode.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_err = |source| TransportError::Bind {
            path: path.clone(),
            source,
        };

        if let Ok(metadata) = std::fs::symlink_metadata(&path) {
            if !metadata.file_type().is_socket() {
                return Err(bind_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                )));
            }
            debug!(?path, "removing stale socket");
            std::fs::remove_file(&path).map_err(bind_err)?;
        }

        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;

        info!(?path, "listening on unix stream socket");

        Ok(Self {
            listener,
            created_inode: Some((created.dev(), created.ino())),
            path,
        })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<SocketStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(path = ?self.path, "accepted connection");
        Ok(SocketStream::from_unix(stream))
    }

    /// Switch the listener between blocking and non-blocking accepts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    fn unique_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "vhalc-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn connect_send_recv_against_listener() {
        let dir = unique_dir("uds");
        let sock_path = dir.join("cam.sock");
        let listener = UnixSocketListener::bind(&sock_path).unwrap();

        let client = UnixStreamClient::new(&sock_path);
        assert!(!client.is_connected());
        client.connect().unwrap();
        assert!(client.is_connected());
        assert!(client.native_handle().is_some());

        let mut server = listener.accept().unwrap();
        assert_eq!(client.send(b"hello").unwrap(), 5);
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(&[1, 0, 0, 0]).unwrap();
        let mut ctrl = [0u8; 4];
        assert_eq!(client.recv(&mut ctrl).unwrap(), 4);
        assert_eq!(ctrl, [1, 0, 0, 0]);

        client.close();
        drop(listener);
        assert!(!sock_path.exists(), "socket file should be cleaned up on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn connect_without_listener_fails() {
        let dir = unique_dir("uds-absent");
        let client = UnixStreamClient::new(dir.join("absent.sock"));

        let err = client.connect().unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(!client.is_connected());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn double_close_leaves_transport_disconnected() {
        let never_opened = UnixStreamClient::new("/nonexistent/vhal.sock");
        never_opened.close();
        never_opened.close();
        assert!(!never_opened.is_connected());

        let dir = unique_dir("uds-close");
        let sock_path = dir.join("close.sock");
        let _listener = UnixSocketListener::bind(&sock_path).unwrap();
        let client = UnixStreamClient::new(&sock_path);
        client.connect().unwrap();

        client.close();
        client.close();
        assert!(!client.is_connected());
        assert!(client.native_handle().is_none());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn path_too_long() {
        let long_path = "/tmp/".to_string() + &"a".repeat(200) + ".sock";

        let client = UnixStreamClient::new(&long_path);
        assert!(matches!(
            client.connect(),
            Err(TransportError::PathTooLong { .. })
        ));
        assert!(matches!(
            UnixSocketListener::bind(&long_path),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[test]
    fn bind_default_permissions_hardened() {
        let dir = unique_dir("uds-perms");
        let sock_path = dir.join("perm.sock");

        let listener = UnixSocketListener::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn bind_replaces_stale_socket_but_not_regular_file() {
        let dir = unique_dir("uds-stale");
        let sock_path = dir.join("stale.sock");

        let first = UnixSocketListener::bind(&sock_path).unwrap();
        std::mem::forget(first);
        assert!(sock_path.exists());
        let _second = UnixSocketListener::bind(&sock_path).unwrap();

        let file_path = dir.join("regular.sock");
        std::fs::write(&file_path, b"regular-file").unwrap();
        assert!(matches!(
            UnixSocketListener::bind(&file_path),
            Err(TransportError::Bind { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn drop_does_not_remove_replaced_path() {
        let dir = unique_dir("uds-drop");
        let sock_path = dir.join("drop.sock");

        let listener = UnixSocketListener::bind(&sock_path).unwrap();
        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement-file").unwrap();

        drop(listener);
        assert!(
            sock_path.exists(),
            "drop must not remove path if inode identity changed"
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}

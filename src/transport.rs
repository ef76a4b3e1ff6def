//! Transport establishment for the session.
//!
//! A [`Connector`] opens a fresh duplex stream for every connection attempt;
//! the session owns exactly one stream at a time and replaces it wholesale on
//! reconnect. The stream itself is a dumb channel; framing, retry policy,
//! and close sequencing all live above it.

use std::{net::SocketAddr, path::PathBuf};

use async_trait::async_trait;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tracing::debug;

use crate::error::ConnectError;

/// Trait alias for streams a session can drive.
pub trait SessionStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T> SessionStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Factory opening a fresh transport per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Stream type produced by this connector.
    type Stream: SessionStream + 'static;

    /// Open a new transport.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError`] when the endpoint is refused or unreachable.
    async fn open(&self) -> Result<Self::Stream, ConnectError>;
}

/// Connector for TCP endpoints (gateway-style sessions).
#[derive(Clone, Debug)]
pub struct TcpConnector {
    addr: SocketAddr,
}

impl TcpConnector {
    /// Build a connector for `addr`.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self { Self { addr } }

    /// Target address of this connector.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn open(&self) -> Result<Self::Stream, ConnectError> {
        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Number of socket slots the desktop service may listen on.
const IPC_SLOTS: u32 = 10;

/// Connector for the desktop service's local socket (RPC-style sessions).
///
/// The service binds the first free slot of `discord-ipc-{0..9}`, so the
/// connector probes the slots in order and takes the first one that accepts.
#[derive(Clone, Debug, Default)]
pub struct IpcConnector {
    /// Override for the socket directory; tests point this at a temp dir.
    base_dir: Option<PathBuf>,
}

impl IpcConnector {
    /// Build a connector using the platform's advertised socket location.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Build a connector probing sockets under `base_dir` instead of the
    /// platform default. Only meaningful on Unix.
    #[must_use]
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self {
            base_dir: Some(base_dir),
        }
    }

    #[cfg(unix)]
    fn socket_dir(&self) -> PathBuf {
        if let Some(dir) = &self.base_dir {
            return dir.clone();
        }
        ["XDG_RUNTIME_DIR", "TMPDIR", "TMP", "TEMP"]
            .iter()
            .find_map(|var| std::env::var_os(var).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("/tmp"))
    }

    /// Candidate socket paths in probe order.
    #[must_use]
    pub fn candidate_paths(&self) -> Vec<PathBuf> {
        #[cfg(unix)]
        {
            let dir = self.socket_dir();
            (0..IPC_SLOTS)
                .map(|slot| dir.join(format!("discord-ipc-{slot}")))
                .collect()
        }
        #[cfg(windows)]
        {
            (0..IPC_SLOTS)
                .map(|slot| PathBuf::from(format!(r"\\?\pipe\discord-ipc-{slot}")))
                .collect()
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl Connector for IpcConnector {
    type Stream = tokio::net::UnixStream;

    async fn open(&self) -> Result<Self::Stream, ConnectError> {
        let candidates = self.candidate_paths();
        let attempts = candidates.len();
        for path in candidates {
            match tokio::net::UnixStream::connect(&path).await {
                Ok(stream) => {
                    debug!(path = %path.display(), "ipc socket accepted");
                    return Ok(stream);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "ipc socket probe failed"),
            }
        }
        Err(ConnectError::NoSocket { attempts })
    }
}

#[cfg(windows)]
#[async_trait]
impl Connector for IpcConnector {
    type Stream = tokio::net::windows::named_pipe::NamedPipeClient;

    async fn open(&self) -> Result<Self::Stream, ConnectError> {
        use tokio::net::windows::named_pipe::ClientOptions;

        let candidates = self.candidate_paths();
        let attempts = candidates.len();
        for path in candidates {
            match ClientOptions::new().open(&path) {
                Ok(pipe) => {
                    debug!(path = %path.display(), "named pipe accepted");
                    return Ok(pipe);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "named pipe probe failed"),
            }
        }
        Err(ConnectError::NoSocket { attempts })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn candidate_paths_cover_all_slots_in_order() {
        let connector = IpcConnector::with_base_dir(PathBuf::from("/run/user/1000"));
        let paths = connector.candidate_paths();
        assert_eq!(paths.len(), 10);
        assert_eq!(paths[0], PathBuf::from("/run/user/1000/discord-ipc-0"));
        assert_eq!(paths[9], PathBuf::from("/run/user/1000/discord-ipc-9"));
    }

    #[tokio::test]
    async fn open_reports_attempts_when_no_socket_listens() {
        let dir = std::env::temp_dir().join("livewire-ipc-test-empty");
        let _ = std::fs::create_dir_all(&dir);
        let connector = IpcConnector::with_base_dir(dir);

        let err = connector.open().await.expect_err("no socket should listen");
        assert!(matches!(err, ConnectError::NoSocket { attempts: 10 }));
    }

    #[tokio::test]
    async fn open_takes_the_first_listening_slot() {
        let dir = std::env::temp_dir().join(format!("livewire-ipc-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create socket dir");
        let listener =
            tokio::net::UnixListener::bind(dir.join("discord-ipc-3")).expect("bind socket");

        let connector = IpcConnector::with_base_dir(dir.clone());
        let (opened, accepted) = tokio::join!(connector.open(), listener.accept());
        opened.expect("slot 3 should accept");
        accepted.expect("listener should see the probe");

        let _ = std::fs::remove_dir_all(&dir);
    }
}

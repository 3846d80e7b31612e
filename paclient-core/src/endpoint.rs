//! Server socket addressing.
//!
//! The audio server listens on a single `AF_UNIX`/`SOCK_STREAM` socket
//! whose path is derived from the OS runtime directory and a connection-type
//! tag. Records on it are length-prefixed (see `paclient_proto::codec`)
//! precisely because stream sockets carry no message boundaries of their
//! own, unlike the `SOCK_SEQPACKET` pair used for each stream's audio
//! control channel.

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which server socket to connect to.
///
/// `Native` is the only variant the server currently exposes; the enum
/// exists so a second connection type (e.g. a restricted/sandboxed socket)
/// can be added without changing the resolution API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionType {
    Native,
}

impl ConnectionType {
    const fn socket_file_name(self) -> &'static str {
        match self {
            Self::Native => "audio-server.socket",
        }
    }
}

impl fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "native"),
        }
    }
}

/// Errors resolving the server socket path.
#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("neither XDG_RUNTIME_DIR nor a fallback runtime directory is set")]
    NoRuntimeDir,
}

/// Resolve the path of the server's listening socket.
///
/// Uses `XDG_RUNTIME_DIR` when set (the normal case on a modern Linux
/// desktop session), falling back to `/run/user/<uid>` so headless/minimal
/// environments without a session manager still resolve a usable path.
pub fn resolve_socket_path(connection_type: ConnectionType) -> Result<PathBuf, EndpointError> {
    let runtime_dir = runtime_dir()?;
    Ok(runtime_dir.join(connection_type.socket_file_name()))
}

fn runtime_dir() -> Result<PathBuf, EndpointError> {
    if let Ok(dir) = env::var("XDG_RUNTIME_DIR") {
        if !dir.is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }

    // SAFETY-free fallback: getuid() has no failure mode worth reporting.
    let uid = unsafe { libc::getuid() };
    let fallback = PathBuf::from(format!("/run/user/{uid}"));
    if fallback.is_dir() {
        return Ok(fallback);
    }

    Err(EndpointError::NoRuntimeDir)
}

/// The directory the control worker installs its filesystem watch on: the
/// parent of the resolved socket path.
#[must_use]
pub fn watch_directory(socket_path: &Path) -> &Path {
    socket_path.parent().unwrap_or(Path::new("/"))
}

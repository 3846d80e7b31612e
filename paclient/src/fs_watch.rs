//! Filesystem watch for the server socket's create/delete lifecycle.
//!
//! `WAIT_FOR_SOCKET` needs to know the instant the server creates its
//! listening socket, and `CONNECTED` needs to know the instant the socket
//! file disappears (server died or restarted). `inotify` on the runtime
//! directory gives both without polling.

use std::ffi::OsStr;
use std::os::fd::{AsFd, AsRawFd, RawFd};
use std::path::Path;

use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};

use paclient_core::error::{ClientError, Result};

/// Watches one directory for the appearance/disappearance of a named
/// socket file.
pub struct SocketFileWatch {
    inotify: Inotify,
    _watch: WatchDescriptor,
    socket_file_name: std::ffi::OsString,
}

/// What happened to the watched socket file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketFileEvent {
    Created,
    Deleted,
    /// An event for a different file in the same directory; ignore it.
    Unrelated,
}

impl SocketFileWatch {
    pub fn new(directory: &Path, socket_file_name: &OsStr) -> Result<Self> {
        let inotify = Inotify::init(InitFlags::IN_NONBLOCK | InitFlags::IN_CLOEXEC)
            .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

        let watch = inotify
            .add_watch(
                directory,
                AddWatchFlags::IN_CREATE | AddWatchFlags::IN_DELETE | AddWatchFlags::IN_MOVED_TO,
            )
            .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

        Ok(Self {
            inotify,
            _watch: watch,
            socket_file_name: socket_file_name.to_owned(),
        })
    }

    #[must_use]
    pub fn raw_fd(&self) -> RawFd {
        self.inotify.as_fd().as_raw_fd()
    }

    /// Drain pending events, classifying each against the watched file
    /// name. Call after the multiplexer reports the descriptor readable.
    pub fn read_events(&self) -> Result<Vec<SocketFileEvent>> {
        let events = self
            .inotify
            .read_events()
            .map_err(|errno| ClientError::Io(std::io::Error::from_raw_os_error(errno as i32)))?;

        Ok(events
            .into_iter()
            .map(|event| match &event.name {
                Some(name) if name == &self.socket_file_name => {
                    if event.mask.contains(nix::sys::inotify::AddWatchFlags::IN_DELETE) {
                        SocketFileEvent::Deleted
                    } else {
                        SocketFileEvent::Created
                    }
                }
                _ => SocketFileEvent::Unrelated,
            })
            .collect())
    }
}

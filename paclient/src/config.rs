//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use paclient_core::endpoint::ConnectionType;

const DEFAULT_ERROR_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Configuration for a [`crate::client::Client`].
///
/// Builder-style: construct with [`ClientConfig::default`] and chain
/// `with_*` methods.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) connection_type: ConnectionType,
    pub(crate) server_path_override: Option<PathBuf>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) error_delay: Duration,
    pub(crate) command_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Native,
            server_path_override: None,
            connect_timeout: None,
            error_delay: DEFAULT_ERROR_DELAY,
            command_channel_capacity: DEFAULT_COMMAND_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_connection_type(mut self, connection_type: ConnectionType) -> Self {
        self.connection_type = connection_type;
        self
    }

    /// Bypass runtime-directory resolution and dial this socket path
    /// directly -- mainly for tests against a local server double.
    #[must_use]
    pub fn with_server_path_override(mut self, path: impl Into<PathBuf>) -> Self {
        self.server_path_override = Some(path.into());
        self
    }

    /// Bound how long the synchronous connect variant blocks. `None`
    /// (the default) waits until the event loop reports CONNECTED with no
    /// deadline.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// How long the connection state machine waits in ERROR_DELAY before
    /// returning to WAIT_FOR_SOCKET. Defaults to 2 seconds.
    #[must_use]
    pub fn with_error_delay(mut self, delay: Duration) -> Self {
        self.error_delay = delay;
        self
    }

    /// Bound on the number of in-flight commands queued to the control
    /// worker before callers start blocking.
    #[must_use]
    pub fn with_command_channel_capacity(mut self, capacity: usize) -> Self {
        self.command_channel_capacity = capacity;
        self
    }

    #[must_use]
    pub const fn connection_type(&self) -> ConnectionType {
        self.connection_type
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    #[must_use]
    pub const fn error_delay(&self) -> Duration {
        self.error_delay
    }
}

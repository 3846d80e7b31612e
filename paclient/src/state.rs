//! Connection state machine.
//!
//! One transition per external event. `server_fd` is only meaningful in
//! {`WaitForWritable`, `FirstMessage`, `Connected`, `ErrorDelay`}: in
//! `WaitForSocket` the socket file is absent from the filesystem, and in
//! `ErrorDelay` the only live descriptor is the monotonic timer.

use tracing::{debug, warn};

/// The connection's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    WaitForSocket,
    WaitForWritable,
    FirstMessage,
    Connected,
    ErrorDelay,
}

/// Coarse connection status exposed to callers, collapsing the six
/// internal states into the three a user callback actually needs to
/// distinguish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// `ErrorDelay`: setup failed and a reconnect attempt is backed off.
    Failed,
    /// Any state between `Disconnected` and `Connected`.
    Disconnected,
    Connected,
}

impl ConnectionStatus {
    #[must_use]
    pub fn from_state(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Connected => Self::Connected,
            ConnectionState::ErrorDelay => Self::Failed,
            ConnectionState::Disconnected
            | ConnectionState::WaitForSocket
            | ConnectionState::WaitForWritable
            | ConnectionState::FirstMessage => Self::Disconnected,
        }
    }
}

/// An external event fed into the state machine.
#[derive(Debug, Clone, Copy)]
pub enum ConnectionEvent {
    RequestConnect,
    SocketFileCreated,
    SocketFileDeleted,
    ConnectWritable,
    ConnectRefused,
    FirstServerMessage { client_id: u32 },
    Hangup,
    ReadError,
    SetupError,
    TimerExpired,
}

/// Side effect the caller must perform after a transition. Kept separate
/// from the state enum itself so the state machine stays pure and
/// testable without a real socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    InstallFsWatch,
    OpenSocketAndConnect,
    MakeSocketBlocking,
    CloseSocket,
    MapServerState,
    ReRegisterNotifications,
    SignalConnectedEvent,
    TearDownStreams,
    UnmapServerState,
    DrainConnectedEvent,
    ArmErrorTimer,
    CloseErrorTimer,
    None,
}

/// Pure transition function: given the current state and an event,
/// produce the next state and the action the caller must perform.
///
/// Returns `None` if the event has no defined transition from this state
/// (the caller should log and ignore it).
#[must_use]
pub fn transition(state: ConnectionState, event: ConnectionEvent) -> Option<(ConnectionState, Action)> {
    use ConnectionEvent as E;
    use ConnectionState as S;

    // An unrecoverable setup error always wins except from Disconnected,
    // regardless of what state we were in.
    if matches!(event, E::SetupError) && state != S::Disconnected {
        return Some((S::ErrorDelay, Action::ArmErrorTimer));
    }

    match (state, event) {
        (S::Disconnected, E::RequestConnect) => Some((S::WaitForSocket, Action::InstallFsWatch)),

        (S::WaitForSocket, E::SocketFileCreated) => {
            Some((S::WaitForWritable, Action::OpenSocketAndConnect))
        }

        (S::WaitForWritable, E::ConnectWritable) => {
            Some((S::FirstMessage, Action::MakeSocketBlocking))
        }
        (S::WaitForWritable, E::ConnectRefused) => Some((S::WaitForSocket, Action::CloseSocket)),

        (S::FirstMessage, E::FirstServerMessage { .. }) => {
            Some((S::Connected, Action::SignalConnectedEvent))
        }

        (S::Connected, E::Hangup | E::ReadError | E::SocketFileDeleted) => {
            Some((S::WaitForSocket, Action::TearDownStreams))
        }

        (S::ErrorDelay, E::TimerExpired) => Some((S::WaitForSocket, Action::CloseErrorTimer)),

        _ => None,
    }
}

/// Drive `state` through `event`, logging the transition and returning the
/// action to perform. The caller owns applying the action's side effects
/// (opening sockets, mapping memory) -- this function only decides what
/// should happen.
pub fn apply(state: &mut ConnectionState, event: ConnectionEvent) -> Action {
    match transition(*state, event) {
        Some((next, action)) => {
            debug!(?state, ?event, ?next, ?action, "connection state transition");
            *state = next;
            action
        }
        None => {
            warn!(?state, ?event, "event has no transition from current state, ignoring");
            Action::None
        }
    }
}

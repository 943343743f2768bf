//! Connection state machine for language connections.

/// State of one language connection.
///
/// Transitions:
/// - Disconnected -> Connecting (supervisor started)
/// - Connecting -> Open (transport up, handshake done, documents replayed)
/// - Connecting -> Reconnecting (connect or handshake failed)
/// - Open -> Reconnecting (transport closed or errored)
/// - Reconnecting -> Connecting (after backoff)
/// - any -> Closed (teardown; terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, supervisor not yet running
    Disconnected,
    /// Transport being opened or handshake in progress
    Connecting,
    /// Ready for requests and notifications
    Open,
    /// Session lost, waiting for the next attempt
    Reconnecting,
    /// Torn down (terminal state)
    Closed,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }

    pub fn is_open(self) -> bool {
        self == ConnectionState::Open
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

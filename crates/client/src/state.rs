//! Push channel connection state.

use serde::Serialize;

/// Where the push channel stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Not started, or shut down.
    Disconnected,
    /// Dialing, or waiting to redial after a closure.
    Connecting,
    Connected,
    /// Retries exhausted; updates arrive through polling only.
    Degraded,
}

/// Inputs that move the connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connection attempt is starting.
    Dial,
    /// The handshake completed.
    Opened,
    /// The connection closed or a dial failed.
    Closed { retries_left: u32 },
    /// The retry budget is spent.
    GaveUp,
    Shutdown,
}

impl ConnectionState {
    /// Pure transition function.
    pub fn on(self, event: ConnectionEvent) -> ConnectionState {
        use ConnectionEvent as E;
        use ConnectionState as S;

        match (self, event) {
            (_, E::Shutdown) => S::Disconnected,
            (S::Connected, E::Dial) => S::Connected,
            (_, E::Dial) => S::Connecting,
            (S::Connecting, E::Opened) => S::Connected,
            (S::Degraded, E::Closed { .. }) => S::Degraded,
            (_, E::Closed { retries_left: 0 }) => S::Degraded,
            (_, E::Closed { .. }) => S::Connecting,
            (_, E::GaveUp) => S::Degraded,
            (state, E::Opened) => state,
        }
    }

    /// Whether push frames can currently arrive.
    pub fn is_live(self) -> bool {
        self == ConnectionState::Connected
    }
}

#[cfg(test)]
mod tests {
    use super::{ConnectionEvent as E, ConnectionState as S};

    #[test]
    fn happy_path() {
        let state = S::Disconnected.on(E::Dial);
        assert_eq!(state, S::Connecting);
        let state = state.on(E::Opened);
        assert_eq!(state, S::Connected);
        assert!(state.is_live());
    }

    #[test]
    fn closure_with_budget_reconnects() {
        let state = S::Connected.on(E::Closed { retries_left: 3 });
        assert_eq!(state, S::Connecting);
        assert_eq!(state.on(E::Dial).on(E::Opened), S::Connected);
    }

    #[test]
    fn exhausted_budget_degrades() {
        assert_eq!(S::Connecting.on(E::Closed { retries_left: 0 }), S::Degraded);
        assert_eq!(S::Connecting.on(E::GaveUp), S::Degraded);
        assert!(!S::Degraded.is_live());
    }

    #[test]
    fn degraded_ignores_late_closures() {
        assert_eq!(S::Degraded.on(E::Closed { retries_left: 2 }), S::Degraded);
        assert_eq!(S::Degraded.on(E::Opened), S::Degraded);
    }

    #[test]
    fn shutdown_always_disconnects() {
        for state in [S::Disconnected, S::Connecting, S::Connected, S::Degraded] {
            assert_eq!(state.on(E::Shutdown), S::Disconnected);
        }
    }

    #[test]
    fn opened_without_dial_is_ignored() {
        assert_eq!(S::Disconnected.on(E::Opened), S::Disconnected);
    }
}

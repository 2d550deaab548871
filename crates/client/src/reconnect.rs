//! Bounded fixed-delay reconnection for the push channel.
//!
//! When the channel drops, the sync engine calls [`reconnect_loop`],
//! which redials after a fixed delay until it succeeds, the retry budget
//! runs out, or the [`CancellationToken`] is triggered. A successful
//! connection resets the budget for the next closure.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::channel::{PushClient, PushConnection};
use crate::state::ConnectionEvent;

/// Retry policy for the push channel.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Redials allowed after a closure before giving up.
    pub max_attempts: u32,
    /// Fixed wait before each redial.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

/// How a reconnect loop ended.
pub enum ReconnectOutcome {
    Connected(PushConnection),
    Exhausted,
    Cancelled,
}

/// Redial until connected, out of attempts, or cancelled.
///
/// `on_event` observes every closure and dial so the caller can drive
/// its [`ConnectionState`](crate::state::ConnectionState).
pub async fn reconnect_loop(
    client: &PushClient,
    config: &ReconnectConfig,
    cancel: &CancellationToken,
    mut on_event: impl FnMut(ConnectionEvent),
) -> ReconnectOutcome {
    let mut retries_left = config.max_attempts;

    loop {
        on_event(ConnectionEvent::Closed { retries_left });
        if retries_left == 0 {
            tracing::warn!(
                client_id = %client.client_id(),
                max_attempts = config.max_attempts,
                "Push channel retries exhausted, falling back to polling",
            );
            return ReconnectOutcome::Exhausted;
        }
        retries_left -= 1;
        let attempt = config.max_attempts - retries_left;

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return ReconnectOutcome::Cancelled,
            _ = tokio::time::sleep(config.delay) => {}
        }

        tracing::info!(
            client_id = %client.client_id(),
            attempt,
            delay_ms = config.delay.as_millis() as u64,
            "Reconnecting push channel",
        );
        on_event(ConnectionEvent::Dial);

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!(client_id = %client.client_id(), "Reconnect cancelled");
                return ReconnectOutcome::Cancelled;
            }
            result = client.connect() => {
                match result {
                    Ok(conn) => {
                        tracing::info!(
                            client_id = %client.client_id(),
                            attempt,
                            "Push channel reconnected",
                        );
                        return ReconnectOutcome::Connected(conn);
                    }
                    Err(e) => {
                        tracing::warn!(
                            client_id = %client.client_id(),
                            error = %e,
                            "Reconnect attempt {attempt} failed",
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdash_core::session::ClientId;

    fn unreachable_client() -> PushClient {
        PushClient::new("ws://127.0.0.1:1", ClientId::generate(), "1")
    }

    #[test]
    fn default_budget() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn cancellation_token_stops_reconnect() {
        let cancel = CancellationToken::new();
        // Cancel immediately; the loop must return without dialing.
        cancel.cancel();

        let mut dials = 0;
        let outcome = reconnect_loop(
            &unreachable_client(),
            &ReconnectConfig::default(),
            &cancel,
            |event| {
                if event == ConnectionEvent::Dial {
                    dials += 1;
                }
            },
        )
        .await;

        assert!(matches!(outcome, ReconnectOutcome::Cancelled));
        assert_eq!(dials, 0);
    }

    #[tokio::test]
    async fn zero_budget_gives_up_immediately() {
        let config = ReconnectConfig {
            max_attempts: 0,
            delay: Duration::from_millis(1),
        };
        let mut events = Vec::new();

        let outcome = reconnect_loop(
            &unreachable_client(),
            &config,
            &CancellationToken::new(),
            |event| events.push(event),
        )
        .await;

        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        assert_eq!(events, vec![ConnectionEvent::Closed { retries_left: 0 }]);
    }

    #[tokio::test]
    async fn failed_dials_count_down_the_budget() {
        let config = ReconnectConfig {
            max_attempts: 2,
            delay: Duration::from_millis(1),
        };
        let mut events = Vec::new();

        let outcome = reconnect_loop(
            &unreachable_client(),
            &config,
            &CancellationToken::new(),
            |event| events.push(event),
        )
        .await;

        assert!(matches!(outcome, ReconnectOutcome::Exhausted));
        assert_eq!(
            events,
            vec![
                ConnectionEvent::Closed { retries_left: 2 },
                ConnectionEvent::Dial,
                ConnectionEvent::Closed { retries_left: 1 },
                ConnectionEvent::Dial,
                ConnectionEvent::Closed { retries_left: 0 },
            ]
        );
    }
}

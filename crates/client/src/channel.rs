//! WebSocket client for the job service push channel.
//!
//! [`PushClient`] holds what is needed to dial the channel for one
//! identity. Call [`PushClient::connect`] to establish a live
//! [`PushConnection`]. Reconnects reuse the same client id so the job
//! service keeps routing frames to this process.

use stockdash_core::session::ClientId;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type PushStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection parameters for the push channel.
#[derive(Debug, Clone)]
pub struct PushClient {
    ws_url: String,
    client_id: ClientId,
    owner_id: String,
}

/// A live push channel connection.
pub struct PushConnection {
    pub client_id: ClientId,
    pub ws_stream: PushStream,
}

/// Errors that can occur when working with the push channel.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl PushClient {
    /// * `ws_url`    - push base URL, e.g. `ws://host:8000`.
    /// * `client_id` - per-process correlation id.
    /// * `owner_id`  - the signed-in identity, sent as the `token` query parameter.
    pub fn new(ws_url: impl Into<String>, client_id: ClientId, owner_id: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
            client_id,
            owner_id: owner_id.into(),
        }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Full channel URL: `{ws_url}/ws/{client_id}?token={owner_id}`.
    pub fn url(&self) -> String {
        format!(
            "{}/ws/{}?token={}",
            self.ws_url, self.client_id, self.owner_id
        )
    }

    pub async fn connect(&self) -> Result<PushConnection, PushError> {
        let (ws_stream, _response) = connect_async(self.url()).await.map_err(|e| {
            PushError::Connection(format!(
                "Failed to open push channel at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!(
            client_id = %self.client_id,
            "Push channel connected at {}",
            self.ws_url,
        );

        Ok(PushConnection {
            client_id: self.client_id.clone(),
            ws_stream,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_carries_client_id_and_owner() {
        let client_id = ClientId::generate();
        let client = PushClient::new("ws://localhost:8000/", client_id.clone(), "42");

        assert_eq!(
            client.url(),
            format!("ws://localhost:8000/ws/{client_id}?token=42")
        );
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let client = PushClient::new("ws://127.0.0.1:1", ClientId::generate(), "1");
        assert!(matches!(
            client.connect().await,
            Err(PushError::Connection(_))
        ));
    }
}

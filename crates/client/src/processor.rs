//! Push channel read loop.
//!
//! Reads raw frames from the push channel, parses them into
//! [`PushMessage`] variants and merges job updates into the board.

use futures::StreamExt;
use stockdash_core::board::UpdateSource;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::channel::{PushError, PushStream};
use crate::messages::{parse_message, PushMessage};
use crate::sync::SyncShared;

/// Process frames until the channel closes, fails, or `cancel` fires.
///
/// Returns `Ok(())` on a clean close or cancellation and
/// [`PushError::Protocol`] on a receive error. Malformed frames are logged
/// and dropped without ending the loop.
pub(crate) async fn process_frames(
    ws_stream: &mut PushStream,
    shared: &SyncShared,
    cancel: &CancellationToken,
) -> Result<(), PushError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = ws_stream.close(None).await;
                return Ok(());
            }
            frame = ws_stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => handle_text_message(&text, shared).await,
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!("Ignoring binary push frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(?frame, "Push channel closed by server");
                return Ok(());
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::error!(error = %e, "Push channel receive error");
                return Err(PushError::Protocol(e.to_string()));
            }
            None => {
                tracing::info!("Push channel stream exhausted");
                return Ok(());
            }
        }
    }
}

async fn handle_text_message(text: &str, shared: &SyncShared) {
    match parse_message(text) {
        Ok(PushMessage::JobUpdate(snapshot)) => {
            tracing::debug!(
                job_id = %snapshot.job_id,
                status = ?snapshot.status,
                progress = ?snapshot.progress,
                "Job update pushed",
            );
            shared.apply(snapshot, UpdateSource::Push).await;
        }
        Ok(PushMessage::Other) => {
            tracing::debug!(raw_message = %text, "Ignoring push frame of unknown type");
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                raw_message = %text,
                "Failed to parse push frame",
            );
        }
    }
}

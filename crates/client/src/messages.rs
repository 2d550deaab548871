//! Push channel message types and parser.
//!
//! The job service sends flat JSON frames tagged by a `"type"` field, e.g.
//! `{"type": "job_update", "job_id": "...", "status": "running", ...}`.

use serde::Deserialize;
use stockdash_core::job::JobSnapshot;

/// All push frames this client understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    /// A change to one job. The remaining fields form a partial snapshot.
    #[serde(rename = "job_update")]
    JobUpdate(JobSnapshot),

    /// Any other frame type. Ignored by the sync engine.
    #[serde(other)]
    Other,
}

/// Parse a push channel text frame.
///
/// Returns `Err` for malformed JSON or a `job_update` frame whose fields
/// do not decode. Callers should log and drop the frame.
pub fn parse_message(text: &str) -> Result<PushMessage, serde_json::Error> {
    serde_json::from_str(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockdash_core::job::JobStatus;

    #[test]
    fn parse_job_update_message() {
        let json = r#"{"type":"job_update","job_id":"abc","status":"running","progress":40,"worker_id":"w1"}"#;
        let msg = parse_message(json).unwrap();
        match msg {
            PushMessage::JobUpdate(snapshot) => {
                assert_eq!(snapshot.job_id, "abc");
                assert_eq!(snapshot.status, Some(JobStatus::Running));
                assert_eq!(snapshot.progress, Some(40.0));
                assert_eq!(snapshot.worker_id.as_deref(), Some("w1"));
                assert!(snapshot.search_text.is_none());
            }
            other => panic!("Expected JobUpdate, got {other:?}"),
        }
    }

    #[test]
    fn parse_job_update_with_sequence() {
        let json = r#"{"type":"job_update","job_id":"abc","seq":7}"#;
        match parse_message(json).unwrap() {
            PushMessage::JobUpdate(snapshot) => assert_eq!(snapshot.seq, Some(7)),
            other => panic!("Expected JobUpdate, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_type_is_other() {
        let json = r#"{"type":"heartbeat","at":"now"}"#;
        assert!(matches!(parse_message(json).unwrap(), PushMessage::Other));
    }

    #[test]
    fn parse_job_update_without_id_returns_error() {
        let json = r#"{"type":"job_update","status":"running"}"#;
        assert!(parse_message(json).is_err());
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        assert!(parse_message("not json at all").is_err());
    }
}

//! Control messages exchanged on a job's status socket.
//!
//! Status pushes are plain [`JobStatusRecord`](crate::job_status::JobStatusRecord)
//! JSON; the messages here are the small control frames around them.

use serde_json::{json, Value};

pub const MSG_TYPE_PING: &str = "ping";
pub const MSG_TYPE_PONG: &str = "pong";

pub const CONNECTION_CONNECTED: &str = "connected";

/// Heartbeat sent by the server.
pub fn ping_message() -> Value {
    json!({ "type": MSG_TYPE_PING })
}

/// Reply to a client's ping.
pub fn pong_message() -> Value {
    json!({ "type": MSG_TYPE_PONG })
}

/// Sent on connect when no status exists yet for the job.
pub fn connected_message(job_id: &str) -> Value {
    json!({
        "job_id": job_id,
        "status": CONNECTION_CONNECTED,
        "message": "WebSocket connection established",
    })
}

/// Whether an inbound text frame is a client ping.
pub fn is_ping(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == MSG_TYPE_PING))
        .unwrap_or(false)
}

/// Whether an outbound text frame is a control frame rather than a status
/// snapshot: a ping, a pong, or the connection notice.
pub fn is_control_frame(text: &str) -> bool {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return false;
    };
    matches!(
        value.get("type").and_then(Value::as_str),
        Some(MSG_TYPE_PING | MSG_TYPE_PONG)
    ) || value.get("status").and_then(Value::as_str) == Some(CONNECTION_CONNECTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_ping_frames() {
        assert!(is_ping(r#"{"type":"ping"}"#));
        assert!(!is_ping(r#"{"type":"pong"}"#));
        assert!(!is_ping("ping"));
    }

    #[test]
    fn ping_and_pong_shapes() {
        assert_eq!(ping_message().to_string(), r#"{"type":"ping"}"#);
        assert_eq!(pong_message()["type"], "pong");
        assert_eq!(connected_message("job_1")["status"], "connected");
    }

    #[test]
    fn control_frames_are_told_apart_from_snapshots() {
        assert!(is_control_frame(&ping_message().to_string()));
        assert!(is_control_frame(&pong_message().to_string()));
        assert!(is_control_frame(&connected_message("job_1").to_string()));
        assert!(!is_control_frame(r#"{"job_id":"job_1","status":"processing","progress":10}"#));
        assert!(!is_control_frame("not json"));
    }
}

use serde_json::Value;

use casebridge_core::RelayError;

/// One webhook-delivered chat event, reduced to the three cases the relay
/// distinguishes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    UrlVerification { challenge: String },
    Message(MessageEvent),
    Other { event_type: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageEvent {
    pub channel_id: String,
    /// Thread correlation key: `thread_ts` when the message is a reply,
    /// otherwise the message's own `ts` (it roots a new thread).
    pub thread_id: String,
    /// Delivery-provided identifier, shared across redeliveries of the same
    /// event.
    pub event_id: String,
    pub text: String,
}

/// Composite key recognizing redelivered events.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub channel_id: String,
    pub thread_id: String,
    pub event_id: String,
}

impl From<&MessageEvent> for DedupKey {
    fn from(event: &MessageEvent) -> Self {
        Self {
            channel_id: event.channel_id.clone(),
            thread_id: event.thread_id.clone(),
            event_id: event.event_id.clone(),
        }
    }
}

/// Parse a Slack Events API envelope into an `InboundEvent`.
///
/// Missing required fields are a `MalformedEvent`, never a silent default.
/// Bot-authored and subtyped messages map to `Other` so the relay's own
/// placeholder posts can never feed back into it.
pub fn parse_envelope(body: &Value) -> Result<InboundEvent, RelayError> {
    let envelope_type = required_str(body, "type", "envelope")?;

    match envelope_type {
        "url_verification" => {
            let challenge = required_str(body, "challenge", "url_verification envelope")?;
            Ok(InboundEvent::UrlVerification { challenge: challenge.to_owned() })
        }
        "event_callback" => parse_event_callback(body),
        other => Ok(InboundEvent::Other { event_type: other.to_owned() }),
    }
}

fn parse_event_callback(body: &Value) -> Result<InboundEvent, RelayError> {
    let event_id = required_str(body, "event_id", "event_callback envelope")?;
    let event = body.get("event").ok_or_else(|| {
        RelayError::MalformedEvent("event_callback envelope missing `event`".into())
    })?;
    let event_type = required_str(event, "type", "event payload")?;

    if event_type != "message" {
        return Ok(InboundEvent::Other { event_type: event_type.to_owned() });
    }
    if event.get("bot_id").is_some_and(|value| !value.is_null()) {
        return Ok(InboundEvent::Other { event_type: "bot_message".to_owned() });
    }
    if let Some(subtype) = event.get("subtype").and_then(Value::as_str) {
        return Ok(InboundEvent::Other { event_type: format!("message.{subtype}") });
    }

    let channel_id = required_str(event, "channel", "message event")?;
    let ts = required_str(event, "ts", "message event")?;
    let thread_id = event.get("thread_ts").and_then(Value::as_str).unwrap_or(ts);
    let text = event.get("text").and_then(Value::as_str).unwrap_or_default();

    Ok(InboundEvent::Message(MessageEvent {
        channel_id: channel_id.to_owned(),
        thread_id: thread_id.to_owned(),
        event_id: event_id.to_owned(),
        text: text.to_owned(),
    }))
}

fn required_str<'a>(value: &'a Value, key: &str, context: &str) -> Result<&'a str, RelayError> {
    value
        .get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| RelayError::MalformedEvent(format!("{context} missing `{key}`")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use casebridge_core::RelayError;

    use super::{parse_envelope, DedupKey, InboundEvent, MessageEvent};

    #[test]
    fn url_verification_preserves_challenge_verbatim() {
        let event = parse_envelope(&json!({
            "type": "url_verification",
            "challenge": "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P",
        }))
        .expect("parse");

        assert_eq!(
            event,
            InboundEvent::UrlVerification {
                challenge: "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P".to_owned()
            }
        );
    }

    #[test]
    fn message_event_uses_thread_ts_when_present() {
        let event = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev1",
            "event": {
                "type": "message",
                "channel": "C1",
                "ts": "1730000001.0002",
                "thread_ts": "1730000000.0001",
                "text": "What's the status of account Acme?",
            },
        }))
        .expect("parse");

        assert_eq!(
            event,
            InboundEvent::Message(MessageEvent {
                channel_id: "C1".to_owned(),
                thread_id: "1730000000.0001".to_owned(),
                event_id: "Ev1".to_owned(),
                text: "What's the status of account Acme?".to_owned(),
            })
        );
    }

    #[test]
    fn top_level_message_roots_its_own_thread() {
        let event = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev2",
            "event": { "type": "message", "channel": "C1", "ts": "1730000002.0000", "text": "hi" },
        }))
        .expect("parse");

        let InboundEvent::Message(message) = event else { panic!("expected message event") };
        assert_eq!(message.thread_id, "1730000002.0000");
    }

    #[test]
    fn bot_messages_are_routed_as_other() {
        let event = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev3",
            "event": {
                "type": "message",
                "channel": "C1",
                "ts": "1730000003.0000",
                "text": ":mag: Searching...",
                "bot_id": "B99",
            },
        }))
        .expect("parse");

        assert_eq!(event, InboundEvent::Other { event_type: "bot_message".to_owned() });
    }

    #[test]
    fn edited_messages_are_routed_as_other() {
        let event = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev4",
            "event": {
                "type": "message",
                "subtype": "message_changed",
                "channel": "C1",
                "ts": "1730000004.0000",
            },
        }))
        .expect("parse");

        assert_eq!(event, InboundEvent::Other { event_type: "message.message_changed".to_owned() });
    }

    #[test]
    fn non_message_events_are_routed_as_other() {
        let event = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev5",
            "event": { "type": "reaction_added" },
        }))
        .expect("parse");

        assert_eq!(event, InboundEvent::Other { event_type: "reaction_added".to_owned() });
    }

    #[test]
    fn missing_channel_is_a_malformed_event() {
        let error = parse_envelope(&json!({
            "type": "event_callback",
            "event_id": "Ev6",
            "event": { "type": "message", "ts": "1730000005.0000", "text": "hi" },
        }))
        .expect_err("should fail");

        assert!(
            matches!(error, RelayError::MalformedEvent(ref message) if message.contains("channel"))
        );
    }

    #[test]
    fn missing_envelope_type_is_a_malformed_event() {
        let error = parse_envelope(&json!({"event": {}})).expect_err("should fail");
        assert!(matches!(error, RelayError::MalformedEvent(_)));
    }

    #[test]
    fn dedup_key_combines_channel_thread_and_event_id() {
        let message = MessageEvent {
            channel_id: "C1".to_owned(),
            thread_id: "T1".to_owned(),
            event_id: "Ev1".to_owned(),
            text: "hello".to_owned(),
        };

        let key = DedupKey::from(&message);
        assert_eq!(key.channel_id, "C1");
        assert_eq!(key.thread_id, "T1");
        assert_eq!(key.event_id, "Ev1");
    }
}

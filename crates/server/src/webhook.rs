//! Slack Events API webhook.
//!
//! Slack retries deliveries that are not acknowledged within three seconds,
//! so the handler acknowledges immediately and hands the event to a spawned
//! relay task. Only the `url_verification` handshake is answered inline.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{info, warn};

use casebridge_slack::{
    events::parse_envelope, InboundEvent, RelayBridge, SignatureVerifier,
};

#[derive(Clone)]
pub struct WebhookState {
    pub relay: Arc<RelayBridge>,
    pub verifier: Option<Arc<SignatureVerifier>>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route("/slack/events", post(slack_events)).with_state(state)
}

pub async fn slack_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(verifier) = &state.verifier {
        if let Err(error) = verify_request(verifier, &headers, &body) {
            warn!(
                event_name = "webhook.signature_rejected",
                error = %error,
                "rejecting request with invalid signature"
            );
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let envelope: Value = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(error) => {
            warn!(
                event_name = "webhook.malformed_payload",
                error = %error,
                "acknowledging undecodable payload"
            );
            return StatusCode::OK.into_response();
        }
    };

    match parse_envelope(&envelope) {
        Ok(InboundEvent::UrlVerification { challenge }) => {
            info!(event_name = "webhook.url_verification", "answering endpoint challenge");
            Json(json!({ "challenge": challenge })).into_response()
        }
        Ok(event) => {
            let relay = state.relay.clone();
            tokio::spawn(async move {
                relay.handle_event(event).await;
            });
            StatusCode::OK.into_response()
        }
        Err(error) => {
            warn!(
                event_name = "webhook.malformed_event",
                error = %error,
                "acknowledging unparseable event"
            );
            StatusCode::OK.into_response()
        }
    }
}

fn verify_request(
    verifier: &SignatureVerifier,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), casebridge_slack::SignatureError> {
    let timestamp = headers
        .get("x-slack-request-timestamp")
        .and_then(|value| value.to_str().ok())
        .ok_or(casebridge_slack::SignatureError::MissingHeaders)?;
    let signature = headers
        .get("x-slack-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or(casebridge_slack::SignatureError::MissingHeaders)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0);

    verifier.verify(timestamp, body, signature, now)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{body::Bytes, extract::State, http::HeaderMap};
    use secrecy::SecretString;
    use tokio::sync::Mutex;

    use casebridge_agent::{AgentInvoker, InvokerError};
    use casebridge_slack::{
        ChatApi, ChatApiError, RelayBridge, RelayPolicy, SignatureVerifier,
    };

    use super::{slack_events, WebhookState};

    #[derive(Default)]
    struct RecordingChat {
        posts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ChatApi for RecordingChat {
        async fn post_message(
            &self,
            _channel: &str,
            _thread: &str,
            text: &str,
        ) -> Result<String, ChatApiError> {
            self.posts.lock().await.push(text.to_owned());
            Ok("1730000000.0100".to_owned())
        }

        async fn update_message(
            &self,
            _channel: &str,
            _message_id: &str,
            _text: &str,
        ) -> Result<(), ChatApiError> {
            Ok(())
        }
    }

    struct StubAgent;

    #[async_trait]
    impl AgentInvoker for StubAgent {
        async fn invoke(&self, _input: &str) -> Result<String, InvokerError> {
            Ok("answer".to_owned())
        }
    }

    fn state(chat: Arc<RecordingChat>, verifier: Option<Arc<SignatureVerifier>>) -> WebhookState {
        WebhookState {
            relay: Arc::new(RelayBridge::new(chat, Arc::new(StubAgent), RelayPolicy::default())),
            verifier,
        }
    }

    async fn call(state: WebhookState, headers: HeaderMap, body: &str) -> axum::response::Response {
        slack_events(State(state), headers, Bytes::copy_from_slice(body.as_bytes())).await
    }

    #[tokio::test]
    async fn url_verification_is_answered_inline_with_the_challenge() {
        let chat = Arc::new(RecordingChat::default());
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;

        let response = call(state(chat.clone(), None), HeaderMap::new(), body).await;

        assert_eq!(response.status(), 200);
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["challenge"], "abc123");
        assert!(chat.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn message_event_is_acknowledged_and_relayed_in_the_background() {
        let chat = Arc::new(RecordingChat::default());
        let body = r#"{
            "type": "event_callback",
            "event_id": "Ev1",
            "event": {"type": "message", "channel": "C1", "ts": "1.0", "text": "hello"}
        }"#;

        let response = call(state(chat.clone(), None), HeaderMap::new(), body).await;
        assert_eq!(response.status(), 200);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(chat.posts.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn undecodable_payload_is_acknowledged_without_side_effects() {
        let chat = Arc::new(RecordingChat::default());

        let response = call(state(chat.clone(), None), HeaderMap::new(), "not json").await;

        assert_eq!(response.status(), 200);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(chat.posts.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unsigned_request_is_rejected_when_verification_is_configured() {
        let chat = Arc::new(RecordingChat::default());
        let verifier = Arc::new(SignatureVerifier::new(SecretString::from("secret")));
        let body = r#"{"type":"url_verification","challenge":"abc123"}"#;

        let response = call(state(chat, Some(verifier)), HeaderMap::new(), body).await;

        assert_eq!(response.status(), 401);
    }
}

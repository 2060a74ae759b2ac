use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChatApiError {
    #[error("chat api transport failed: {0}")]
    Transport(String),
    #[error("chat api returned error `{0}`")]
    Api(String),
    #[error("chat api response missing field `{0}`")]
    MissingField(&'static str),
}

/// The two outbound chat calls the relay is allowed to make.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Post a threaded message; returns the platform-assigned message id.
    async fn post_message(
        &self,
        channel: &str,
        thread: &str,
        text: &str,
    ) -> Result<String, ChatApiError>;

    /// Replace the body of an existing message.
    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatApiError>;
}

/// Slack Web API client. Every method POSTs JSON with bearer auth and checks
/// the `ok` field; Slack reports most failures inside a 200 response.
pub struct SlackApiClient {
    http: reqwest::Client,
    bot_token: SecretString,
    api_base: String,
}

impl SlackApiClient {
    pub fn new(bot_token: SecretString) -> Self {
        Self { http: reqwest::Client::new(), bot_token, api_base: SLACK_API_BASE.to_string() }
    }

    pub fn with_api_base(bot_token: SecretString, api_base: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), bot_token, api_base: api_base.into() }
    }

    async fn call(&self, method: &str, payload: &Value) -> Result<Value, ChatApiError> {
        debug!(method, "slack api call");

        let response = self
            .http
            .post(format!("{}/{method}", self.api_base))
            .bearer_auth(self.bot_token.expose_secret())
            .json(payload)
            .send()
            .await
            .map_err(|err| ChatApiError::Transport(format!("{method}: {err}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|err| ChatApiError::Transport(format!("{method} decode: {err}")))?;

        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let reason =
                body.get("error").and_then(Value::as_str).unwrap_or("unknown").to_owned();
            return Err(ChatApiError::Api(reason));
        }

        Ok(body)
    }
}

#[async_trait]
impl ChatApi for SlackApiClient {
    async fn post_message(
        &self,
        channel: &str,
        thread: &str,
        text: &str,
    ) -> Result<String, ChatApiError> {
        let payload = json!({
            "channel": channel,
            "thread_ts": thread,
            "text": text,
        });
        let body = self.call("chat.postMessage", &payload).await?;

        body.get("ts")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(ChatApiError::MissingField("ts"))
    }

    async fn update_message(
        &self,
        channel: &str,
        message_id: &str,
        text: &str,
    ) -> Result<(), ChatApiError> {
        // The mrkdwn block mirrors the plain text so threads render Slack
        // formatting from the agent's answer.
        let payload = json!({
            "channel": channel,
            "ts": message_id,
            "text": text,
            "blocks": [
                { "type": "section", "text": { "type": "mrkdwn", "text": text } }
            ],
        });
        self.call("chat.update", &payload).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::ChatApiError;

    #[test]
    fn api_errors_carry_the_slack_error_token() {
        let error = ChatApiError::Api("channel_not_found".to_owned());
        assert_eq!(error.to_string(), "chat api returned error `channel_not_found`");
    }

    #[test]
    fn missing_field_names_the_field() {
        let error = ChatApiError::MissingField("ts");
        assert!(error.to_string().contains("ts"));
    }
}

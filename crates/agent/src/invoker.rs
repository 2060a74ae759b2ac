use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use casebridge_core::config::AgentConfig;

/// One relay invocation's request value object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentRequest {
    pub input: String,
}

/// One relay invocation's response value object.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AgentResponse {
    pub output: String,
}

#[derive(Debug, Error)]
pub enum InvokerError {
    #[error("agent request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("agent api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected agent response shape: {0}")]
    Decode(String),
}

/// The reasoning/tool-orchestration collaborator: free text in, final answer
/// out. The relay owns the outer timeout around `invoke`.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(&self, input: &str) -> Result<String, InvokerError>;
}

/// HTTP client for a remote agent runtime exposing the
/// `POST {base_url}/invoke` `{"input"}` → `{"output"}` contract.
///
/// The reqwest-level timeout is a second bound behind the relay's own; it
/// keeps a wedged connection from outliving the event that started it.
pub struct RemoteAgentInvoker {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteAgentInvoker {
    pub fn new(config: &AgentConfig) -> Result<Self, reqwest::Error> {
        let http =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { base_url: config.base_url.trim_end_matches('/').to_string(), http })
    }
}

#[async_trait]
impl AgentInvoker for RemoteAgentInvoker {
    async fn invoke(&self, input: &str) -> Result<String, InvokerError> {
        let url = format!("{}/invoke", self.base_url);
        debug!(event_name = "agent.invoke.start", url = %url, "invoking remote agent");

        let response = self
            .http
            .post(&url)
            .json(&AgentRequest { input: input.to_owned() })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(InvokerError::Api { status, body });
        }

        let decoded: AgentResponse = response
            .json()
            .await
            .map_err(|err| InvokerError::Decode(err.to_string()))?;

        debug!(
            event_name = "agent.invoke.complete",
            output_chars = decoded.output.len(),
            "remote agent returned"
        );
        Ok(decoded.output)
    }
}

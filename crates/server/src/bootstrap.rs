use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use casebridge_agent::{AgentInvoker, RemoteAgentInvoker, ToolRegistry};
use casebridge_core::config::{AppConfig, ConfigError, LoadOptions};
use casebridge_crm::{register_crm_tools, SalesforceApi, SalesforceClient};
use casebridge_slack::{ChatApi, RelayBridge, RelayPolicy, SignatureVerifier, SlackApiClient};

/// Fully wired runtime: every collaborator behind its trait, shared via `Arc`
/// so each webhook task can hold a handle.
pub struct Application {
    pub config: AppConfig,
    pub relay: Arc<RelayBridge>,
    pub registry: Arc<ToolRegistry>,
    pub verifier: Option<Arc<SignatureVerifier>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let chat: Arc<dyn ChatApi> = Arc::new(SlackApiClient::new(config.slack.bot_token.clone()));
    let agent: Arc<dyn AgentInvoker> =
        Arc::new(RemoteAgentInvoker::new(&config.agent).map_err(BootstrapError::HttpClient)?);

    let policy = RelayPolicy {
        backend_timeout: Duration::from_secs(config.agent.timeout_secs),
        update_retry_backoff: Duration::from_millis(config.relay.update_retry_backoff_ms),
        dedup_retention: Duration::from_secs(config.relay.dedup_retention_secs),
    };
    let relay = Arc::new(RelayBridge::new(chat, agent, policy));

    let salesforce: Arc<dyn SalesforceApi> =
        Arc::new(SalesforceClient::new(config.salesforce.clone()));
    let mut registry = ToolRegistry::new();
    register_crm_tools(&mut registry, salesforce);
    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tool_count = registry.len(),
        "crm tools registered"
    );

    let verifier = config
        .slack
        .signing_secret
        .as_ref()
        .map(|secret| Arc::new(SignatureVerifier::new(secret.clone())));
    if verifier.is_none() {
        info!(
            event_name = "system.bootstrap.signature_verification_disabled",
            correlation_id = "bootstrap",
            "no signing secret configured; webhook signatures will not be checked"
        );
    }

    Ok(Application { config, relay, registry: Arc::new(registry), verifier })
}

#[cfg(test)]
mod tests {
    use casebridge_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            slack_bot_token: Some("xoxb-test".to_string()),
            salesforce_client_id: Some("client-id".to_string()),
            salesforce_client_secret: Some("client-secret".to_string()),
            salesforce_username: Some("svc@example.com".to_string()),
            salesforce_password: Some("hunter2".to_string()),
            salesforce_security_token: Some("token123".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_with_malformed_bot_token() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_bot_token: Some("invalid-token".to_string()),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("slack.bot_token"));
    }

    #[tokio::test]
    async fn bootstrap_registers_all_four_crm_tools() {
        let app = bootstrap(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        let names: Vec<String> =
            app.registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "create_salesforce_case",
                "search_account_summary",
                "search_salesforce_knowledge",
                "search_salesforce_opportunities",
            ]
        );
    }

    #[tokio::test]
    async fn bootstrap_enables_signature_verification_when_secret_is_present() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                slack_signing_secret: Some("8f742231b10e8888abcd99yyyzzz85a5".to_string()),
                ..valid_overrides()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("bootstrap should succeed with valid overrides");

        assert!(app.verifier.is_some());
    }
}

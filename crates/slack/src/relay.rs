use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use casebridge_agent::AgentInvoker;
use casebridge_core::{ChatStage, RelayError};

use crate::api::ChatApi;
use crate::events::{DedupKey, InboundEvent, MessageEvent};

/// Neutral indicator shown while the backend computes an answer.
pub const WORKING_TEXT: &str = ":mag: Searching...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaceholderStatus {
    Posted,
    Updated,
    Failed,
}

/// The provisional reply holding the thread slot. Owned exclusively by the
/// relay; mutated only by its update step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaceholderMessage {
    pub channel_id: String,
    pub message_id: String,
    pub status: PlaceholderStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// `url_verification`: echo this challenge back, nothing else.
    Challenge(String),
    /// Non-message event or empty text; acknowledged with no side effects.
    Ignored,
    /// Redelivery of an already-processed event id.
    Duplicate,
    /// The placeholder carries the agent's answer.
    Answered(PlaceholderMessage),
    /// The placeholder carries the fixed error text.
    ErrorReported(PlaceholderMessage),
    /// Processing stopped without a terminal placeholder update.
    Abandoned(RelayError),
}

/// Timing knobs for one relay instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayPolicy {
    /// Upper bound on the backend call.
    pub backend_timeout: Duration,
    /// Pause before the single placeholder-update retry.
    pub update_retry_backoff: Duration,
    /// How long a dedup key suppresses redeliveries.
    pub dedup_retention: Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            backend_timeout: Duration::from_secs(45),
            update_retry_backoff: Duration::from_millis(500),
            dedup_retention: Duration::from_secs(300),
        }
    }
}

/// Bounded recent-history set of processed event keys.
///
/// The only state shared across event tasks; the lock is held for map access
/// only, never across an await on chat or backend calls.
struct DedupWindow {
    retention: Duration,
    seen: Mutex<HashMap<DedupKey, Instant>>,
}

impl DedupWindow {
    fn new(retention: Duration) -> Self {
        Self { retention, seen: Mutex::new(HashMap::new()) }
    }

    /// Record `key` and report whether it is fresh. Expired entries are swept
    /// on the same lock acquisition, bounding the map by the event rate over
    /// one retention window.
    async fn check_and_record(&self, key: DedupKey) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        seen.retain(|_, inserted| now.duration_since(*inserted) < self.retention);

        match seen.get(&key) {
            Some(_) => false,
            None => {
                seen.insert(key, now);
                true
            }
        }
    }
}

/// Bridges one inbound chat event to one outbound chat update:
/// `Received → PlaceholderPosted → {AnswerApplied | ErrorApplied}`, with
/// `Received → Rejected` when the initial post fails.
pub struct RelayBridge {
    chat: Arc<dyn ChatApi>,
    agent: Arc<dyn AgentInvoker>,
    policy: RelayPolicy,
    dedup: DedupWindow,
}

impl RelayBridge {
    pub fn new(chat: Arc<dyn ChatApi>, agent: Arc<dyn AgentInvoker>, policy: RelayPolicy) -> Self {
        let dedup = DedupWindow::new(policy.dedup_retention);
        Self { chat, agent, policy, dedup }
    }

    /// Process one inbound event to a terminal outcome. Never panics and
    /// never returns early with the thread stuck on the working indicator.
    pub async fn handle_event(&self, event: InboundEvent) -> RelayOutcome {
        match event {
            InboundEvent::UrlVerification { challenge } => {
                debug!(event_name = "relay.url_verification", "echoing endpoint challenge");
                RelayOutcome::Challenge(challenge)
            }
            InboundEvent::Other { event_type } => {
                debug!(event_name = "relay.event_ignored", event_type, "ignoring event");
                RelayOutcome::Ignored
            }
            InboundEvent::Message(message) => self.relay_message(message).await,
        }
    }

    async fn relay_message(&self, message: MessageEvent) -> RelayOutcome {
        if message.text.trim().is_empty() {
            debug!(
                event_name = "relay.event_ignored",
                event_id = %message.event_id,
                "ignoring message with empty text"
            );
            return RelayOutcome::Ignored;
        }

        if !self.dedup.check_and_record(DedupKey::from(&message)).await {
            info!(
                event_name = "relay.duplicate_suppressed",
                event_id = %message.event_id,
                thread_id = %message.thread_id,
                "suppressing redelivered event"
            );
            return RelayOutcome::Duplicate;
        }

        let message_id = match self
            .chat
            .post_message(&message.channel_id, &message.thread_id, WORKING_TEXT)
            .await
        {
            Ok(message_id) => message_id,
            Err(error) => {
                warn!(
                    event_name = "relay.placeholder_post_failed",
                    event_id = %message.event_id,
                    thread_id = %message.thread_id,
                    error = %error,
                    "placeholder post failed; aborting before backend call"
                );
                return RelayOutcome::Abandoned(RelayError::ChatApi {
                    stage: ChatStage::Post,
                    message: error.to_string(),
                });
            }
        };
        info!(
            event_name = "relay.placeholder_posted",
            event_id = %message.event_id,
            thread_id = %message.thread_id,
            message_id = %message_id,
            "placeholder posted"
        );

        let mut placeholder = PlaceholderMessage {
            channel_id: message.channel_id.clone(),
            message_id,
            status: PlaceholderStatus::Posted,
        };

        let limit = self.policy.backend_timeout;
        let answer = match tokio::time::timeout(limit, self.agent.invoke(&message.text)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => Err(RelayError::Backend(error.to_string())),
            Err(_) => Err(RelayError::BackendTimeout { limit_secs: limit.as_secs() }),
        };

        let terminal_text = match &answer {
            Ok(output) => output.as_str(),
            Err(error) => {
                warn!(
                    event_name = "relay.backend_failed",
                    event_id = %message.event_id,
                    thread_id = %message.thread_id,
                    error = %error,
                    "backend call failed; applying error text"
                );
                error.user_message()
            }
        };

        if let Err(update_error) = self.apply_terminal_update(&placeholder, terminal_text).await {
            warn!(
                event_name = "relay.update_unrecoverable",
                event_id = %message.event_id,
                thread_id = %message.thread_id,
                message_id = %placeholder.message_id,
                error = %update_error,
                "placeholder update failed after retry; giving up on this event"
            );
            return RelayOutcome::Abandoned(RelayError::ChatApi {
                stage: ChatStage::Update,
                message: update_error.to_string(),
            });
        }

        match answer {
            Ok(_) => {
                placeholder.status = PlaceholderStatus::Updated;
                info!(
                    event_name = "relay.answer_applied",
                    event_id = %message.event_id,
                    thread_id = %message.thread_id,
                    message_id = %placeholder.message_id,
                    "answer applied to placeholder"
                );
                RelayOutcome::Answered(placeholder)
            }
            Err(_) => {
                placeholder.status = PlaceholderStatus::Failed;
                RelayOutcome::ErrorReported(placeholder)
            }
        }
    }

    /// Update the placeholder, retrying exactly once after a short backoff.
    /// More retries would risk a storm against the chat API.
    async fn apply_terminal_update(
        &self,
        placeholder: &PlaceholderMessage,
        text: &str,
    ) -> Result<(), crate::api::ChatApiError> {
        let first_attempt = self
            .chat
            .update_message(&placeholder.channel_id, &placeholder.message_id, text)
            .await;

        let Err(first_error) = first_attempt else {
            return Ok(());
        };

        warn!(
            event_name = "relay.update_retrying",
            message_id = %placeholder.message_id,
            error = %first_error,
            "placeholder update failed; retrying once"
        );
        tokio::time::sleep(self.policy.update_retry_backoff).await;

        self.chat.update_message(&placeholder.channel_id, &placeholder.message_id, text).await
    }
}

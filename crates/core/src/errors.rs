use thiserror::Error;

/// Failure taxonomy for one relayed chat event.
///
/// Every failure on the event path maps onto one of these four cases; the
/// relay decides from the variant whether a placeholder update is still owed
/// to the thread.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("backend call exceeded the {limit_secs}s timeout")]
    BackendTimeout { limit_secs: u64 },
    #[error("backend call failed: {0}")]
    Backend(String),
    #[error("chat api call failed during {stage}: {message}")]
    ChatApi { stage: ChatStage, message: String },
    #[error("malformed inbound event: {0}")]
    MalformedEvent(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatStage {
    Post,
    Update,
}

impl std::fmt::Display for ChatStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Post => write!(f, "placeholder post"),
            Self::Update => write!(f, "placeholder update"),
        }
    }
}

impl RelayError {
    /// Fixed text shown in the thread when the backend could not answer.
    /// Applied verbatim so the thread always reaches a terminal state.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BackendTimeout { .. } => {
                "Sorry, that took longer than expected. Please try asking again."
            }
            Self::Backend(_) => "Sorry, something went wrong while looking that up.",
            Self::ChatApi { .. } => "Sorry, something went wrong while posting the reply.",
            Self::MalformedEvent(_) => "The message could not be processed.",
        }
    }

    /// Whether a placeholder already posted for this event still needs its
    /// terminal `Failed` update.
    pub fn requires_failed_update(&self) -> bool {
        matches!(self, Self::BackendTimeout { .. } | Self::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatStage, RelayError};

    #[test]
    fn backend_failures_require_a_failed_update() {
        assert!(RelayError::BackendTimeout { limit_secs: 45 }.requires_failed_update());
        assert!(RelayError::Backend("boom".to_owned()).requires_failed_update());
        assert!(!RelayError::MalformedEvent("missing channel".to_owned())
            .requires_failed_update());
        assert!(!RelayError::ChatApi {
            stage: ChatStage::Post,
            message: "rate limited".to_owned()
        }
        .requires_failed_update());
    }

    #[test]
    fn timeout_message_is_user_safe_and_fixed() {
        let text = RelayError::BackendTimeout { limit_secs: 45 }.user_message();
        assert!(text.starts_with("Sorry"));
        assert_eq!(text, RelayError::BackendTimeout { limit_secs: 1 }.user_message());
    }

    #[test]
    fn chat_stage_renders_in_error_text() {
        let error = RelayError::ChatApi {
            stage: ChatStage::Update,
            message: "message_not_found".to_owned(),
        };
        assert!(error.to_string().contains("placeholder update"));
    }
}

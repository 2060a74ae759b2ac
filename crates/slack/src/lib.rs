//! Slack Integration - Events API relay surface
//!
//! This crate provides the Slack interface for casebridge:
//! - **Events** (`events`) - Envelope parsing for the Events API webhook
//! - **Signature** (`signature`) - Request signing verification (v0 scheme)
//! - **Web API** (`api`) - `chat.postMessage` / `chat.update` client
//! - **Relay** (`relay`) - Placeholder-then-update bridge to the agent
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Subscribe to `message.channels` / `message.im` events and point the
//!    request URL at `/slack/events`
//! 3. Set env vars: `SLACK_BOT_TOKEN`, `SLACK_SIGNING_SECRET`
//!
//! # Architecture
//!
//! ```text
//! Slack Events → parse_envelope → RelayBridge → AgentInvoker
//!                                      ↓
//!                          placeholder post / update
//! ```
//!
//! # Key Types
//!
//! - `RelayBridge` - Drives one event to a terminal placeholder state
//! - `InboundEvent` - Parsed envelope (challenge, message, or ignorable)
//! - `ChatApi` - Trait over the Slack Web API, faked in tests
//! - `SignatureVerifier` - Rejects requests not signed by Slack

pub mod api;
pub mod events;
pub mod relay;
pub mod signature;

pub use api::{ChatApi, ChatApiError, SlackApiClient};
pub use events::{DedupKey, InboundEvent, MessageEvent};
pub use relay::{
    PlaceholderMessage, PlaceholderStatus, RelayBridge, RelayOutcome, RelayPolicy, WORKING_TEXT,
};
pub use signature::{SignatureError, SignatureVerifier};

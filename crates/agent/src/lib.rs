//! Agent collaborator interface - remote invocation and the tool registry
//!
//! This crate holds the two seams between casebridge and the external
//! reasoning service:
//!
//! - **Invoker** (`invoker`) - `AgentInvoker` trait plus the HTTP client for
//!   the remote runtime's `{"input"}` → `{"output"}` contract. The relay owns
//!   the outer timeout; the client carries a second, transport-level bound.
//! - **Registry** (`registry`) - explicit tool registry (name → description,
//!   input schema, handler) built at startup and served to the agent runtime
//!   over the server's tool endpoint.
//!
//! The planning loop itself lives in the remote runtime. Nothing here decides
//! which tools to call; this crate only describes them and executes one when
//! asked.

pub mod invoker;
pub mod registry;

pub use invoker::{AgentInvoker, AgentRequest, AgentResponse, InvokerError, RemoteAgentInvoker};
pub use registry::{Tool, ToolDescriptor, ToolError, ToolRegistry};

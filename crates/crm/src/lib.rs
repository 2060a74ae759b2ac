//! Salesforce integration - REST client and query tools
//!
//! This crate provides the CRM side of casebridge:
//! - **Client** (`client`) - OAuth2 password-grant session, SOSL search, SOQL
//!   query with pagination, Case creation; all responses decoded into typed
//!   structs at the boundary
//! - **Tools** (`tools`) - the four query tools the agent runtime can call:
//!   knowledge search, opportunity search, case creation, account summary
//!
//! The tools format query results into plain text; anything smarter than
//! formatting belongs to the agent runtime.

pub mod client;
pub mod tools;

pub use client::{
    AccountRecord, CaseRecord, ContactRecord, CreatedCase, CrmError, KnowledgeArticle,
    OpportunityRecord, SalesforceApi, SalesforceClient,
};
pub use tools::register_crm_tools;

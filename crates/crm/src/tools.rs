use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use casebridge_agent::registry::{required_str_arg, Tool, ToolDescriptor, ToolError, ToolRegistry};

use crate::client::{CrmError, SalesforceApi};

/// Search Knowledge articles via SOSL and format one line per hit.
/// Returns an empty string when nothing matches.
pub async fn search_knowledge_articles(
    api: &dyn SalesforceApi,
    query: &str,
) -> Result<String, CrmError> {
    info!(event_name = "crm.tool.knowledge_search", query, "searching knowledge articles");

    let articles = api.search_knowledge(query).await?;
    if articles.is_empty() {
        return Ok(String::new());
    }

    let base_url = api.record_base_url().await?;
    let lines: Vec<String> = articles
        .iter()
        .map(|article| {
            let url = format!("{base_url}/lightning/r/Knowledge__kav/{}/view", article.id);
            format!(
                "Title: {}, Question: {}, Answer: {}, URL: {url}",
                article.title,
                article.question.as_deref().unwrap_or("N/A"),
                article.answer.as_deref().unwrap_or("N/A"),
            )
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Search Opportunity records via SOSL and format one line per hit.
pub async fn search_opportunities(
    api: &dyn SalesforceApi,
    query: &str,
) -> Result<String, CrmError> {
    info!(event_name = "crm.tool.opportunity_search", query, "searching opportunities");

    let opportunities = api.search_opportunities(query).await?;
    let lines: Vec<String> = opportunities
        .iter()
        .map(|opportunity| {
            format!(
                "Opportunity: {}, Close Date: {}, Amount: {}, Stage: {}",
                opportunity.name,
                opportunity.close_date.as_deref().unwrap_or("N/A"),
                format_amount(opportunity.amount),
                opportunity.stage_name.as_deref().unwrap_or("N/A"),
            )
        })
        .collect();

    Ok(lines.join("\n"))
}

/// Create a Case with `Origin=Web`. Failures are returned as text, never as
/// an error, so the agent can relay them verbatim.
pub async fn create_case(api: &dyn SalesforceApi, subject: &str, description: &str) -> String {
    info!(event_name = "crm.tool.case_create", subject, "creating case");

    let created = match api.create_case(subject, description).await {
        Ok(created) => created,
        Err(error) => return format!("Error creating case: {error}"),
    };

    match api.record_base_url().await {
        Ok(base_url) => format!(
            "Case created successfully. Case Link: {base_url}/lightning/r/Case/{}/view",
            created.id
        ),
        Err(error) => format!("Error creating case: {error}"),
    }
}

/// Look up an Account by fuzzy name and report its Opportunities, Contacts,
/// and Cases as a multi-section text summary. Errors are returned as text.
pub async fn summarize_account(api: &dyn SalesforceApi, account_name: &str) -> String {
    info!(event_name = "crm.tool.account_summary", account_name, "summarizing account");

    match build_account_summary(api, account_name).await {
        Ok(summary) => summary,
        Err(error) => format!("Error searching for Account summary: {error}"),
    }
}

async fn build_account_summary(
    api: &dyn SalesforceApi,
    account_name: &str,
) -> Result<String, CrmError> {
    let Some(account) = api.find_account(account_name).await? else {
        return Ok(format!("No Account found with a similar name to '{account_name}'."));
    };

    let opportunities = api.account_opportunities(&account.id).await?;
    let contacts = api.account_contacts(&account.id).await?;
    let cases = api.account_cases(&account.id).await?;

    let mut summary = format!("Account Summary for '{account_name}':\n\n");

    if opportunities.is_empty() {
        summary.push_str("No Opportunities found.\n");
    } else {
        summary.push_str("Opportunities:\n");
        for opportunity in &opportunities {
            summary.push_str(&format!(
                "- Opportunity: {}, Amount: {}, Stage: {}\n",
                opportunity.name,
                format_amount(opportunity.amount),
                opportunity.stage_name.as_deref().unwrap_or("N/A"),
            ));
        }
    }

    if contacts.is_empty() {
        summary.push_str("\nNo Contacts found.\n");
    } else {
        summary.push_str("\nContacts:\n");
        for contact in &contacts {
            summary.push_str(&format!("- Contact: {}\n", contact.name));
        }
    }

    if cases.is_empty() {
        summary.push_str("\nNo Cases found.\n");
    } else {
        summary.push_str("\nCases:\n");
        for case in &cases {
            summary.push_str(&format!(
                "- Case Number: {}, Subject: {}, Description: {}\n",
                case.case_number,
                case.subject.as_deref().unwrap_or("N/A"),
                case.description.as_deref().unwrap_or("N/A"),
            ));
        }
    }

    Ok(summary)
}

fn format_amount(amount: Option<f64>) -> String {
    match amount {
        Some(value) => format!("{value}"),
        None => "N/A".to_string(),
    }
}

fn string_arg_schema(key: &str, description: &str) -> Value {
    json!({
        "type": "object",
        "properties": { key: { "type": "string", "description": description } },
        "required": [key],
    })
}

pub struct KnowledgeSearchTool {
    api: Arc<dyn SalesforceApi>,
}

#[async_trait]
impl Tool for KnowledgeSearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_salesforce_knowledge".to_owned(),
            description: "Searches Salesforce Knowledge articles for a keyword or phrase and \
                          returns matching titles, questions, answers, and record links."
                .to_owned(),
            input_schema: string_arg_schema("query", "Keyword or phrase to search for."),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str_arg("search_salesforce_knowledge", &args, "query")?;
        search_knowledge_articles(self.api.as_ref(), query).await.map_err(|error| {
            ToolError::Execution {
                tool: "search_salesforce_knowledge".to_owned(),
                message: error.to_string(),
            }
        })
    }
}

pub struct OpportunitySearchTool {
    api: Arc<dyn SalesforceApi>,
}

#[async_trait]
impl Tool for OpportunitySearchTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_salesforce_opportunities".to_owned(),
            description: "Searches Salesforce Opportunities for a keyword or phrase and returns \
                          name, close date, amount, and stage for each match."
                .to_owned(),
            input_schema: string_arg_schema("query", "Keyword or phrase to search for."),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let query = required_str_arg("search_salesforce_opportunities", &args, "query")?;
        search_opportunities(self.api.as_ref(), query).await.map_err(|error| {
            ToolError::Execution {
                tool: "search_salesforce_opportunities".to_owned(),
                message: error.to_string(),
            }
        })
    }
}

pub struct CaseCreateTool {
    api: Arc<dyn SalesforceApi>,
}

#[async_trait]
impl Tool for CaseCreateTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "create_salesforce_case".to_owned(),
            description: "Creates a Salesforce Case from a subject and description and returns a \
                          confirmation with a link to the new case. Failures are reported in the \
                          returned text."
                .to_owned(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "subject": { "type": "string", "description": "Case subject line." },
                    "description": { "type": "string", "description": "Full case description." },
                },
                "required": ["subject", "description"],
            }),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let subject = required_str_arg("create_salesforce_case", &args, "subject")?;
        let description = required_str_arg("create_salesforce_case", &args, "description")?;
        Ok(create_case(self.api.as_ref(), subject, description).await)
    }
}

pub struct AccountSummaryTool {
    api: Arc<dyn SalesforceApi>,
}

#[async_trait]
impl Tool for AccountSummaryTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "search_account_summary".to_owned(),
            description: "Looks up an Account by name and summarizes its Opportunities, Contacts, \
                          and Cases."
                .to_owned(),
            input_schema: string_arg_schema("account_name", "Name of the Account to summarize."),
        }
    }

    async fn execute(&self, args: Value) -> Result<String, ToolError> {
        let account_name = required_str_arg("search_account_summary", &args, "account_name")?;
        Ok(summarize_account(self.api.as_ref(), account_name).await)
    }
}

/// Register the four Salesforce query tools against a shared client.
pub fn register_crm_tools(registry: &mut ToolRegistry, api: Arc<dyn SalesforceApi>) {
    registry.register(KnowledgeSearchTool { api: api.clone() });
    registry.register(OpportunitySearchTool { api: api.clone() });
    registry.register(CaseCreateTool { api: api.clone() });
    registry.register(AccountSummaryTool { api });
}

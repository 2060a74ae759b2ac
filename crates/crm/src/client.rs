use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::ExposeSecret;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use casebridge_core::config::SalesforceConfig;

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("salesforce authentication failed: {0}")]
    Auth(String),
    #[error("salesforce request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("salesforce api error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("unexpected salesforce response shape: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct KnowledgeArticle {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Question__c")]
    pub question: Option<String>,
    #[serde(rename = "Answer__c")]
    pub answer: Option<String>,
    #[serde(rename = "UrlName")]
    pub url_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct OpportunityRecord {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CloseDate")]
    pub close_date: Option<String>,
    #[serde(rename = "Amount")]
    pub amount: Option<f64>,
    #[serde(rename = "StageName")]
    pub stage_name: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ContactRecord {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct CaseRecord {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "CaseNumber")]
    pub case_number: String,
    #[serde(rename = "Subject")]
    pub subject: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AccountRecord {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedCase {
    pub id: String,
}

/// Typed boundary over the Salesforce search/query/case APIs.
///
/// The query tools format over this trait; the HTTP client below is the
/// production implementation, tests substitute scripted fakes.
#[async_trait]
pub trait SalesforceApi: Send + Sync {
    async fn search_knowledge(&self, term: &str) -> Result<Vec<KnowledgeArticle>, CrmError>;
    async fn search_opportunities(&self, term: &str) -> Result<Vec<OpportunityRecord>, CrmError>;
    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, CrmError>;
    async fn account_opportunities(
        &self,
        account_id: &str,
    ) -> Result<Vec<OpportunityRecord>, CrmError>;
    async fn account_contacts(&self, account_id: &str) -> Result<Vec<ContactRecord>, CrmError>;
    async fn account_cases(&self, account_id: &str) -> Result<Vec<CaseRecord>, CrmError>;
    async fn create_case(&self, subject: &str, description: &str) -> Result<CreatedCase, CrmError>;

    /// Instance base URL used to build record links shown to users.
    async fn record_base_url(&self) -> Result<String, CrmError>;
}

/// Escape a user-supplied SOSL search term. Braces delimit the FIND clause,
/// so they and the SOSL reserved operators must be backslash-escaped.
pub fn escape_sosl_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '{' | '}' | '"' | '\'' | '?' | '&' | '|' | '!' | '^' | '~' | '*' | ':') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape a string literal for embedding in a SOQL quoted value.
pub fn escape_soql_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Clone, Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Clone, Debug)]
struct Session {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(rename = "searchRecords")]
    search_records: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    records: Vec<T>,
    done: bool,
    #[serde(rename = "nextRecordsUrl")]
    next_records_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
    success: bool,
}

/// Salesforce REST client authenticated via the OAuth2 password grant.
///
/// The session is established lazily on first use and refreshed once when a
/// call comes back 401.
pub struct SalesforceClient {
    http: Client,
    config: SalesforceConfig,
    session: RwLock<Option<Session>>,
}

impl SalesforceClient {
    pub fn new(config: SalesforceConfig) -> Self {
        Self { http: Client::new(), config, session: RwLock::new(None) }
    }

    pub fn with_http_client(config: SalesforceConfig, http: Client) -> Self {
        Self { http, config, session: RwLock::new(None) }
    }

    async fn login(&self) -> Result<Session, CrmError> {
        let url = format!("{}/services/oauth2/token", self.config.login_url.trim_end_matches('/'));
        // simple_salesforce convention: the security token is appended to the
        // password for the password grant.
        let password = format!(
            "{}{}",
            self.config.password.expose_secret(),
            self.config.security_token.expose_secret()
        );
        let params = [
            ("grant_type", "password"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("username", self.config.username.as_str()),
            ("password", password.as_str()),
        ];

        let response = self.http.post(&url).form(&params).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CrmError::Auth(format!("{status} {body}")));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| CrmError::Decode(format!("token response: {err}")))?;

        info!(
            event_name = "crm.salesforce.session_established",
            instance_url = %token.instance_url,
            "salesforce session established"
        );

        Ok(Session { access_token: token.access_token, instance_url: token.instance_url })
    }

    async fn session(&self) -> Result<Session, CrmError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut guard = self.session.write().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }
        let session = self.login().await?;
        *guard = Some(session.clone());
        Ok(session)
    }

    async fn invalidate_session(&self) {
        *self.session.write().await = None;
    }

    /// GET an API path relative to the instance URL, re-authenticating once
    /// if the session has expired.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, CrmError> {
        let mut retried = false;
        loop {
            let session = self.session().await?;
            let url = format!("{}{path}", session.instance_url.trim_end_matches('/'));
            debug!(path, retried, "salesforce GET");

            let response = self
                .http
                .get(&url)
                .bearer_auth(&session.access_token)
                .query(query)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!(path, "salesforce session expired; re-authenticating");
                self.invalidate_session().await;
                retried = true;
                continue;
            }
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(CrmError::Api { status, body });
            }

            return response
                .json::<T>()
                .await
                .map_err(|err| CrmError::Decode(format!("{path}: {err}")));
        }
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, CrmError> {
        let mut retried = false;
        loop {
            let session = self.session().await?;
            let url = format!("{}{path}", session.instance_url.trim_end_matches('/'));
            debug!(path, retried, "salesforce POST");

            let response = self
                .http
                .post(&url)
                .bearer_auth(&session.access_token)
                .json(body)
                .send()
                .await?;

            if response.status() == StatusCode::UNAUTHORIZED && !retried {
                warn!(path, "salesforce session expired; re-authenticating");
                self.invalidate_session().await;
                retried = true;
                continue;
            }
            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(CrmError::Api { status, body });
            }

            return response
                .json::<T>()
                .await
                .map_err(|err| CrmError::Decode(format!("{path}: {err}")));
        }
    }

    async fn search<T: DeserializeOwned>(&self, sosl: &str) -> Result<Vec<T>, CrmError> {
        let path = format!("/services/data/{}/search/", self.config.api_version);
        let response: SearchResponse<T> = self.get_json(&path, &[("q", sosl)]).await?;
        Ok(response.search_records)
    }

    /// Run a SOQL query, following `nextRecordsUrl` pagination to completion.
    async fn query_all<T: DeserializeOwned>(&self, soql: &str) -> Result<Vec<T>, CrmError> {
        let path = format!("/services/data/{}/query/", self.config.api_version);
        let mut page: QueryResponse<T> = self.get_json(&path, &[("q", soql)]).await?;
        let mut records = std::mem::take(&mut page.records);

        while !page.done {
            let next = page.next_records_url.take().ok_or_else(|| {
                CrmError::Decode("paginated query response missing nextRecordsUrl".to_string())
            })?;
            page = self.get_json(&next, &[]).await?;
            records.append(&mut page.records);
        }

        Ok(records)
    }
}

#[async_trait]
impl SalesforceApi for SalesforceClient {
    async fn search_knowledge(&self, term: &str) -> Result<Vec<KnowledgeArticle>, CrmError> {
        let sosl = format!(
            "FIND {{{}}} IN ALL FIELDS RETURNING Knowledge__kav(Id, Title, Question__c, Answer__c, UrlName)",
            escape_sosl_term(term)
        );
        self.search(&sosl).await
    }

    async fn search_opportunities(&self, term: &str) -> Result<Vec<OpportunityRecord>, CrmError> {
        let sosl = format!(
            "FIND {{{}}} IN ALL FIELDS RETURNING Opportunity(Id, Name, CloseDate, Amount, StageName)",
            escape_sosl_term(term)
        );
        self.search(&sosl).await
    }

    async fn find_account(&self, name: &str) -> Result<Option<AccountRecord>, CrmError> {
        let soql = format!(
            "SELECT Id, Name FROM Account WHERE Name LIKE '%{}%' LIMIT 1",
            escape_soql_literal(name)
        );
        Ok(self.query_all::<AccountRecord>(&soql).await?.into_iter().next())
    }

    async fn account_opportunities(
        &self,
        account_id: &str,
    ) -> Result<Vec<OpportunityRecord>, CrmError> {
        let soql = format!(
            "SELECT Id, Name, Amount, StageName FROM Opportunity WHERE AccountId = '{}'",
            escape_soql_literal(account_id)
        );
        self.query_all(&soql).await
    }

    async fn account_contacts(&self, account_id: &str) -> Result<Vec<ContactRecord>, CrmError> {
        let soql = format!(
            "SELECT Id, Name FROM Contact WHERE AccountId = '{}'",
            escape_soql_literal(account_id)
        );
        self.query_all(&soql).await
    }

    async fn account_cases(&self, account_id: &str) -> Result<Vec<CaseRecord>, CrmError> {
        let soql = format!(
            "SELECT Id, CaseNumber, Subject, Description FROM Case WHERE AccountId = '{}'",
            escape_soql_literal(account_id)
        );
        self.query_all(&soql).await
    }

    async fn create_case(&self, subject: &str, description: &str) -> Result<CreatedCase, CrmError> {
        let path = format!("/services/data/{}/sobjects/Case", self.config.api_version);
        let body = json!({
            "Subject": subject,
            "Description": description,
            "Origin": "Web",
        });
        let created: CreateResponse = self.post_json(&path, &body).await?;
        if !created.success {
            return Err(CrmError::Api { status: 200, body: "case create reported failure".into() });
        }
        Ok(CreatedCase { id: created.id })
    }

    async fn record_base_url(&self) -> Result<String, CrmError> {
        let session = self.session().await?;
        Ok(session.instance_url.trim_end_matches('/').to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{escape_soql_literal, escape_sosl_term, QueryResponse, SearchResponse};
    use super::{KnowledgeArticle, OpportunityRecord};

    #[test]
    fn sosl_escaping_neutralizes_braces_and_operators() {
        assert_eq!(escape_sosl_term("acme"), "acme");
        assert_eq!(escape_sosl_term("a{b}"), "a\\{b\\}");
        assert_eq!(escape_sosl_term("vpn? fast!"), "vpn\\? fast\\!");
        assert_eq!(escape_sosl_term("o'brien"), "o\\'brien");
    }

    #[test]
    fn soql_escaping_doubles_backslashes_before_quotes() {
        assert_eq!(escape_soql_literal("Acme"), "Acme");
        assert_eq!(escape_soql_literal("O'Neil"), "O\\'Neil");
        assert_eq!(escape_soql_literal("a\\'b"), "a\\\\\\'b");
    }

    #[test]
    fn search_response_decodes_salesforce_field_names() {
        let payload = r#"{"searchRecords":[
            {"Id":"ka01","Title":"VPN setup","Question__c":"How do I set up VPN?","Answer__c":"Use the portal.","UrlName":"vpn-setup"},
            {"Id":"ka02","Title":"SSO","Question__c":null,"Answer__c":null,"UrlName":null}
        ]}"#;

        let decoded: SearchResponse<KnowledgeArticle> =
            serde_json::from_str(payload).expect("decode");
        assert_eq!(decoded.search_records.len(), 2);
        assert_eq!(decoded.search_records[0].title, "VPN setup");
        assert_eq!(decoded.search_records[1].question, None);
    }

    #[test]
    fn missing_required_field_is_a_decode_error_not_a_silent_default() {
        let payload = r#"{"searchRecords":[{"Question__c":"orphan"}]}"#;
        let decoded = serde_json::from_str::<SearchResponse<KnowledgeArticle>>(payload);
        assert!(decoded.is_err());
    }

    #[test]
    fn query_response_carries_pagination_fields() {
        let payload = r#"{"totalSize":2,"done":false,"nextRecordsUrl":"/services/data/v59.0/query/01g-2000","records":[
            {"Id":"006A","Name":"Acme Renewal","CloseDate":"2026-09-30","Amount":120000.0,"StageName":"Negotiation"}
        ]}"#;

        let decoded: QueryResponse<OpportunityRecord> =
            serde_json::from_str(payload).expect("decode");
        assert!(!decoded.done);
        assert_eq!(decoded.next_records_url.as_deref(), Some("/services/data/v59.0/query/01g-2000"));
        assert_eq!(decoded.records[0].amount, Some(120000.0));
    }
}

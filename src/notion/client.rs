// src/notion/client.rs
//! Notion-backed review inbox. Signals land as pages in one database with a
//! fixed property schema; reviewers flip the Status select and the poll pass
//! reads it back.

use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use super::{InboxDecision, ReviewInbox};
use crate::filter::FilterResult;
use crate::signal::{Decision, RejectionReason, StoredSignal};

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

pub struct NotionInbox {
    http: reqwest::Client,
    token: String,
    database_id: String,
}

impl NotionInbox {
    pub fn new(token: String, database_id: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("consumer-signal-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            token,
            database_id,
        }
    }

    fn page_properties(signal: &StoredSignal, result: &FilterResult) -> Value {
        let (score, category) = result
            .classification
            .as_ref()
            .map(|c| (c.score, c.category.as_str()))
            .unwrap_or((0.0, "other"));
        let status = match signal.status {
            crate::signal::SignalStatus::LlmAutoApprove => "Auto-approved",
            _ => "Review",
        };
        json!({
            "Name": { "title": [{ "text": { "content": signal.signal.title.clone() } }] },
            "URL": { "url": signal.signal.url.clone() },
            "Score": { "number": score },
            "Category": { "select": { "name": category } },
            "Source": { "select": { "name": signal.signal.source_api.as_str() } },
            "Status": { "select": { "name": status } },
        })
    }
}

/// Pull a select-property name out of a page's property map.
fn select_name(props: &Value, prop: &str) -> Option<String> {
    props
        .get(prop)?
        .get("select")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

/// Concatenate a rich-text property's plain text.
fn rich_text(props: &Value, prop: &str) -> Option<String> {
    let parts = props.get(prop)?.get("rich_text")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("plain_text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn decision_from_page(page: &Value) -> Option<InboxDecision> {
    let external_ref = page.get("id")?.as_str()?.to_string();
    let props = page.get("properties")?;
    let decision = match select_name(props, "Status")?.to_ascii_lowercase().as_str() {
        "approved" => Decision::Approved,
        "rejected" => Decision::Rejected,
        _ => return None,
    };
    let rejection_reason = if decision == Decision::Rejected {
        select_name(props, "Rejection Reason")
            .and_then(|s| RejectionReason::parse(&s))
            .or(Some(RejectionReason::Other))
    } else {
        None
    };
    Some(InboxDecision {
        external_ref,
        decision,
        rejection_reason,
        notes: rich_text(props, "Notes"),
    })
}

#[async_trait::async_trait]
impl ReviewInbox for NotionInbox {
    async fn push(&self, signal: &StoredSignal, result: &FilterResult) -> Result<String> {
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": Self::page_properties(signal, result),
        });

        let resp = self
            .http
            .post(format!("{NOTION_API}/pages"))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .context("notion create page")?
            .error_for_status()
            .context("notion create page non-2xx")?;

        let page: Value = resp.json().await.context("notion create page body")?;
        page.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .context("notion create page: missing id")
    }

    async fn poll_decisions(&self) -> Result<Vec<InboxDecision>> {
        let body = json!({
            "filter": {
                "or": [
                    { "property": "Status", "select": { "equals": "Approved" } },
                    { "property": "Status", "select": { "equals": "Rejected" } },
                ]
            }
        });

        let resp = self
            .http
            .post(format!(
                "{NOTION_API}/databases/{}/query",
                self.database_id
            ))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await
            .context("notion query")?
            .error_for_status()
            .context("notion query non-2xx")?;

        let parsed: Value = resp.json().await.context("notion query body")?;
        let results = parsed
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(results.iter().filter_map(decision_from_page).collect())
    }
}

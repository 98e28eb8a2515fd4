// src/collect/hn.rs
//! Hacker News collector (Algolia search API, newest stories for a query).

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::collect::{ensure_metrics_described, normalize_text, SignalCollector};
use crate::signal::{Signal, SourceApi};

const SEARCH_URL: &str = "https://hn.algolia.com/api/v1/search_by_date";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<i64>,
    story_text: Option<String>,
}

pub struct HnCollector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        query: String,
        client: reqwest::Client,
    },
}

impl HnCollector {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    /// Live collector searching newest stories for `query`
    /// (e.g. "launch consumer brand").
    pub fn from_query(query: &str) -> Self {
        Self {
            mode: Mode::Http {
                query: query.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_body(s: &str) -> Result<Vec<Signal>> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let resp: SearchResponse = serde_json::from_str(s).context("parsing hn search json")?;

        let mut out = Vec::with_capacity(resp.hits.len());
        for hit in resp.hits {
            let title = normalize_text(hit.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let mut raw_metadata = BTreeMap::new();
            if let Some(a) = hit.author {
                raw_metadata.insert("author".to_string(), a);
            }
            if let Some(p) = hit.points {
                raw_metadata.insert("points".to_string(), p.to_string());
            }
            if let Some(text) = hit.story_text {
                let text = normalize_text(&text);
                if !text.is_empty() {
                    raw_metadata.insert("description".to_string(), text);
                }
            }
            out.push(Signal {
                source_api: SourceApi::Hn,
                source_id: hit.object_id,
                title,
                url: hit.url,
                raw_metadata,
                collected_at: Utc::now(),
            });
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("collect_signals_total", "source" => "hn").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalCollector for HnCollector {
    async fn collect(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s),
            Mode::Http { query, client } => {
                let resp = client
                    .get(SEARCH_URL)
                    .query(&[("query", query.as_str()), ("tags", "story")])
                    .send()
                    .await
                    .map_err(|e| {
                        counter!("collect_errors_total", "source" => "hn").increment(1);
                        e
                    })
                    .context("hn http get()")?;
                let body = resp.text().await.context("hn http .text()")?;
                Self::parse_body(&body)
            }
        }
    }

    fn source_api(&self) -> SourceApi {
        SourceApi::Hn
    }
}

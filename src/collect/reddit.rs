// src/collect/reddit.rs
//! Reddit collector: newest posts from a subreddit listing. The `t3_` fullname
//! prefix stays on the raw id; canonicalization happens in the dedup engine.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::Deserialize;

use crate::collect::{ensure_metrics_described, normalize_text, SignalCollector};
use crate::signal::{Signal, SourceApi};

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    /// Fullname, e.g. `t3_1abcde`.
    name: String,
    title: Option<String>,
    url: Option<String>,
    selftext: Option<String>,
    subreddit: Option<String>,
    author: Option<String>,
}

pub struct RedditCollector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        subreddit: String,
        client: reqwest::Client,
    },
}

impl RedditCollector {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_subreddit(subreddit: &str) -> Self {
        Self {
            mode: Mode::Http {
                subreddit: subreddit.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_body(s: &str) -> Result<Vec<Signal>> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let listing: Listing = serde_json::from_str(s).context("parsing reddit listing json")?;

        let mut out = Vec::with_capacity(listing.data.children.len());
        for child in listing.data.children {
            let post = child.data;
            let title = normalize_text(post.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let mut raw_metadata = BTreeMap::new();
            if let Some(sr) = post.subreddit {
                raw_metadata.insert("subreddit".to_string(), sr);
            }
            if let Some(a) = post.author {
                raw_metadata.insert("author".to_string(), a);
            }
            if let Some(text) = post.selftext {
                let text = normalize_text(&text);
                if !text.is_empty() {
                    raw_metadata.insert("description".to_string(), text);
                }
            }
            out.push(Signal {
                source_api: SourceApi::Reddit,
                source_id: post.name,
                title,
                url: post.url,
                raw_metadata,
                collected_at: Utc::now(),
            });
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("collect_signals_total", "source" => "reddit").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalCollector for RedditCollector {
    async fn collect(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s),
            Mode::Http { subreddit, client } => {
                let url = format!("https://www.reddit.com/r/{subreddit}/new.json?limit=50");
                let resp = client
                    .get(&url)
                    .header("User-Agent", "consumer-signal-engine/0.1")
                    .send()
                    .await
                    .map_err(|e| {
                        counter!("collect_errors_total", "source" => "reddit").increment(1);
                        e
                    })
                    .context("reddit http get()")?;
                let body = resp.text().await.context("reddit http .text()")?;
                Self::parse_body(&body)
            }
        }
    }

    fn source_api(&self) -> SourceApi {
        SourceApi::Reddit
    }
}

// src/collect/rss.rs
//! Industry-news RSS collector, shared by the BevNET and NOSH feeds. The RSS
//! GUID (falling back to the link) is the stable identity.

use std::collections::BTreeMap;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::collect::{ensure_metrics_described, normalize_text, SignalCollector};
use crate::signal::{Signal, SourceApi};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    guid: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

fn parse_rfc2822_to_unix(ts: &str) -> u64 {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|x| u64::try_from(x).ok())
        .unwrap_or(0)
}

pub struct IndustryRssCollector {
    source_api: SourceApi,
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl IndustryRssCollector {
    pub fn bevnet_fixture(s: &str) -> Self {
        Self::fixture(SourceApi::BevnetRss, s)
    }

    pub fn nosh_fixture(s: &str) -> Self {
        Self::fixture(SourceApi::NoshRss, s)
    }

    pub fn bevnet_url(url: &str) -> Self {
        Self::http(SourceApi::BevnetRss, url)
    }

    pub fn nosh_url(url: &str) -> Self {
        Self::http(SourceApi::NoshRss, url)
    }

    fn fixture(source_api: SourceApi, s: &str) -> Self {
        Self {
            source_api,
            mode: Mode::Fixture(s.to_string()),
        }
    }

    fn http(source_api: SourceApi, url: &str) -> Self {
        Self {
            source_api,
            mode: Mode::Http {
                url: url.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_items(&self, s: &str) -> Result<Vec<Signal>> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let xml_clean = scrub_html_entities_for_xml(s);
        let rss: Rss = from_str(&xml_clean).context("parsing industry rss xml")?;

        let mut out = Vec::with_capacity(rss.channel.item.len());
        for it in rss.channel.item {
            let title = normalize_text(it.title.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            // GUID is the identity; some feeds only carry a link.
            let Some(source_id) = it.guid.clone().or_else(|| it.link.clone()) else {
                continue;
            };
            let mut raw_metadata = BTreeMap::new();
            if let Some(d) = it.description {
                let d = normalize_text(&d);
                if !d.is_empty() {
                    raw_metadata.insert("description".to_string(), d);
                }
            }
            if let Some(ts) = it.pub_date.as_deref() {
                raw_metadata.insert(
                    "published_at".to_string(),
                    parse_rfc2822_to_unix(ts).to_string(),
                );
            }
            out.push(Signal {
                source_api: self.source_api,
                source_id,
                title,
                url: it.link,
                raw_metadata,
                collected_at: Utc::now(),
            });
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("collect_signals_total", "source" => self.source_api.as_str())
            .increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalCollector for IndustryRssCollector {
    async fn collect(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(s) => self.parse_items(s),
            Mode::Http { url, client } => {
                let body = match client.get(url).send().await {
                    Ok(resp) => resp.text().await.context("rss http .text()")?,
                    Err(e) => {
                        tracing::warn!(error = ?e, source = self.source_api.as_str(), "rss http error");
                        counter!("collect_errors_total", "source" => self.source_api.as_str())
                            .increment(1);
                        return Err(e).context("rss http get()");
                    }
                };
                self.parse_items(&body)
            }
        }
    }

    fn source_api(&self) -> SourceApi {
        self.source_api
    }
}

/// Feeds sprinkle HTML entities into what must be valid XML.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

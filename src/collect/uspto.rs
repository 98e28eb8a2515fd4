// src/collect/uspto.rs
//! USPTO trademark-filing collector. New filings in consumer classes are an
//! early signal that a brand exists before it has any press. Serial numbers
//! arrive dashed or spaced depending on the endpoint; the dedup engine strips
//! both.

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
struct SearchResponse {
    #[serde(default)]
    results: Vec<Filing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Filing {
    serial_number: String,
    mark_name: Option<String>,
    owner_name: Option<String>,
    filing_date: Option<String>,
    goods_and_services: Option<String>,
}

pub struct UsptoCollector {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        url: String,
        client: reqwest::Client,
    },
}

impl UsptoCollector {
    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }

    pub fn from_url(url: &str) -> Self {
        Self {
            mode: Mode::Http {
                url: url.to_string(),
                client: reqwest::Client::new(),
            },
        }
    }

    fn parse_body(s: &str) -> Result<Vec<Signal>> {
        ensure_metrics_described();
        let t0 = Instant::now();
        let resp: SearchResponse = serde_json::from_str(s).context("parsing uspto json")?;

        let mut out = Vec::with_capacity(resp.results.len());
        for filing in resp.results {
            let title = normalize_text(filing.mark_name.as_deref().unwrap_or_default());
            if title.is_empty() {
                continue;
            }
            let mut raw_metadata = BTreeMap::new();
            if let Some(o) = filing.owner_name {
                raw_metadata.insert("owner".to_string(), o);
            }
            if let Some(d) = filing.filing_date {
                raw_metadata.insert("filing_date".to_string(), d);
            }
            if let Some(g) = filing.goods_and_services {
                let g = normalize_text(&g);
                if !g.is_empty() {
                    raw_metadata.insert("description".to_string(), g);
                }
            }
            out.push(Signal {
                source_api: SourceApi::UsptoTm,
                source_id: filing.serial_number,
                title,
                url: None,
                raw_metadata,
                collected_at: Utc::now(),
            });
        }

        histogram!("collect_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("collect_signals_total", "source" => "uspto_tm").increment(out.len() as u64);
        Ok(out)
    }
}

#[async_trait]
impl SignalCollector for UsptoCollector {
    async fn collect(&self) -> Result<Vec<Signal>> {
        match &self.mode {
            Mode::Fixture(s) => Self::parse_body(s),
            Mode::Http { url, client } => {
                let resp = client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| {
                        counter!("collect_errors_total", "source" => "uspto_tm").increment(1);
                        e
                    })
                    .context("uspto http get()")?;
                let body = resp.text().await.context("uspto http .text()")?;
                Self::parse_body(&body)
            }
        }
    }

    fn source_api(&self) -> SourceApi {
        SourceApi::UsptoTm
    }
}

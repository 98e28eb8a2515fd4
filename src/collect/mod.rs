// src/collect/mod.rs
//! Source collectors. Each collector yields raw `Signal`s; everything
//! downstream (dedup, filtering, state) belongs to the store and pipeline.
//! Collectors own their fetch/parse quirks and nothing else.

pub mod hn;
pub mod reddit;
pub mod rss;
pub mod uspto;

use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

use crate::signal::{Signal, SourceApi};

/// One-time metrics registration (so series show up for any exporter).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "collect_signals_total",
            "Signals parsed from source payloads."
        );
        describe_counter!("collect_errors_total", "Collector fetch/parse errors.");
        describe_histogram!("collect_parse_ms", "Payload parse time in milliseconds.");
    });
}

/// A producer of raw signals for one external source.
#[async_trait::async_trait]
pub trait SignalCollector: Send + Sync {
    async fn collect(&self) -> anyhow::Result<Vec<Signal>>;
    fn source_api(&self) -> SourceApi;
}

/// Normalize free text from source payloads: entity-decode, strip tags,
/// collapse whitespace, cap length.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();

    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // Length cap: 1500 chars
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}

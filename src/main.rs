//! Signal Engine — Binary Entrypoint
//! Boots the collect → filter → push → poll pipeline on an interval,
//! wiring config, the store, the classifier, and the review inbox.

use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use consumer_signal_engine::collect::hn::HnCollector;
use consumer_signal_engine::collect::reddit::RedditCollector;
use consumer_signal_engine::collect::rss::IndustryRssCollector;
use consumer_signal_engine::collect::uspto::UsptoCollector;
use consumer_signal_engine::collect::SignalCollector;
use consumer_signal_engine::config::{build_classifier, AiConfig, EngineConfig};
use consumer_signal_engine::filter::disqualify::Disqualifier;
use consumer_signal_engine::filter::FilterPipeline;
use consumer_signal_engine::notion::client::NotionInbox;
use consumer_signal_engine::pipeline::{spawn_scheduler, Pipeline};
use consumer_signal_engine::store::SignalStore;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

/// Optional keyword-set override lives next to the other config files.
fn load_disqualifier() -> anyhow::Result<Disqualifier> {
    let path = Path::new("config/disqualifiers.toml");
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        return Disqualifier::from_toml_str(&content);
    }
    Ok(Disqualifier::default())
}

fn build_collectors(cfg: &EngineConfig) -> Vec<Box<dyn SignalCollector>> {
    let mut out: Vec<Box<dyn SignalCollector>> = Vec::new();
    if let Some(q) = &cfg.sources.hn_query {
        out.push(Box::new(HnCollector::from_query(q)));
    }
    for sub in &cfg.sources.reddit_subreddits {
        out.push(Box::new(RedditCollector::from_subreddit(sub)));
    }
    if let Some(url) = &cfg.sources.bevnet_feed {
        out.push(Box::new(IndustryRssCollector::bevnet_url(url)));
    }
    if let Some(url) = &cfg.sources.nosh_feed {
        out.push(Box::new(IndustryRssCollector::nosh_url(url)));
    }
    if let Some(url) = &cfg.sources.uspto_url {
        out.push(Box::new(UsptoCollector::from_url(url)));
    }
    out
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = EngineConfig::load_default()?;
    let store = Arc::new(SignalStore::open(&cfg.store_path)?);
    tracing::info!(statuses = ?store.status_counts(), "resuming from stored state");

    let ai_cfg = AiConfig::load_or_default("config/ai.json");
    let classifier = build_classifier(&ai_cfg, Path::new(&cfg.cache_dir));
    let filter = FilterPipeline::new(load_disqualifier()?, classifier);

    let collectors = build_collectors(&cfg);
    if collectors.is_empty() {
        tracing::warn!("no sources configured; pipeline will only filter, push, and poll");
    }

    let inbox = Arc::new(NotionInbox::new(
        cfg.notion.api_key.clone(),
        cfg.notion.database_id.clone(),
    ));

    let pipeline = Arc::new(Pipeline::new(store, collectors, filter, inbox));
    tracing::info!(interval_secs = cfg.interval_secs, "signal engine started");
    spawn_scheduler(pipeline, cfg.interval_secs).await?;
    Ok(())
}

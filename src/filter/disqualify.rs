// src/filter/disqualify.rs
//! Hard disqualifier: zero-cost keyword rejection, stage 1 of the thesis filter.
//!
//! Each category is a named immutable phrase set evaluated in a fixed priority
//! order (B2B → crypto → services → jobs); the first category that matches and
//! survives consumer-positive suppression short-circuits evaluation. Matching is
//! token-based (case-insensitive, word boundaries), so `"job"` never fires on
//! `"jobber"`.
//!
//! Suppression rule: a rejection is cancelled when a consumer-positive term
//! occurs *outside the token span of every matched disqualifying phrase* of that
//! category. Suppression only cancels the rejection; evaluation continues with
//! the next category and no category ever forces acceptance.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rejection category, in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisqualifyCategory {
    B2b,
    Crypto,
    Services,
    Job,
}

impl DisqualifyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisqualifyCategory::B2b => "b2b",
            DisqualifyCategory::Crypto => "crypto",
            DisqualifyCategory::Services => "services",
            DisqualifyCategory::Job => "job",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            DisqualifyCategory::B2b => "B2B/enterprise",
            DisqualifyCategory::Crypto => "crypto/web3",
            DisqualifyCategory::Services => "professional services",
            DisqualifyCategory::Job => "job posting",
        }
    }
}

impl fmt::Display for DisqualifyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one evaluation. Ephemeral; folded into the filter audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisqualifyResult {
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DisqualifyCategory>,
}

impl DisqualifyResult {
    fn passed() -> Self {
        Self {
            passed: true,
            reason: None,
            category: None,
        }
    }

    fn rejected(category: DisqualifyCategory, phrase: &str) -> Self {
        Self {
            passed: false,
            reason: Some(format!("{} term \"{}\"", category.label(), phrase)),
            category: Some(category),
        }
    }
}

/* ----------------------------
Keyword sets (TOML-overridable)
---------------------------- */

/// Override schema for `config/disqualifiers.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordSets {
    pub b2b: Vec<String>,
    pub crypto: Vec<String>,
    pub services: Vec<String>,
    pub job: Vec<String>,
    pub consumer_positive: Vec<String>,
}

impl Default for KeywordSets {
    fn default() -> Self {
        let v = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            b2b: v(&[
                "b2b",
                "saas",
                "api",
                "enterprise software",
                "enterprise sales",
                "developer tools",
                "devtools",
                "devops",
                "crm",
                "erp",
                "data pipeline",
                "observability",
                "workflow automation",
                "sales enablement",
                "procurement",
            ]),
            crypto: v(&[
                "crypto",
                "cryptocurrency",
                "web3",
                "blockchain",
                "defi",
                "nft",
                "dao",
                "stablecoin",
                "bitcoin",
                "ethereum",
                "token sale",
                "airdrop",
            ]),
            services: v(&[
                "agency",
                "consulting",
                "consultancy",
                "outsourcing",
                "staffing",
                "law firm",
                "accounting firm",
                "dev shop",
                "managed services",
                "freelancing",
            ]),
            job: v(&[
                "hiring",
                "is hiring",
                "who is hiring",
                "job posting",
                "job board",
                "open roles",
                "apply now",
                "careers page",
                "recruiter",
            ]),
            consumer_positive: v(&[
                "food",
                "beverage",
                "drink",
                "snack",
                "coffee",
                "tea",
                "kombucha",
                "seltzer",
                "fitness",
                "wellness",
                "skincare",
                "beauty",
                "supplement",
                "vitamin",
                "travel",
                "hotel",
                "hospitality",
                "restaurant",
                "apparel",
                "footwear",
                "pet",
                "baby",
                "grocery",
                "cpg",
                "dtc",
            ]),
        }
    }
}

/* ----------------------------
Engine
---------------------------- */

/// Phrase stored as its token sequence for window matching.
type Phrase = Vec<String>;

/// Byte-cheap token span: [start, end) in token indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

impl Span {
    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug)]
pub struct Disqualifier {
    /// (category, phrases) in fixed evaluation order.
    sets: Vec<(DisqualifyCategory, Vec<(String, Phrase)>)>,
    consumer_positive: Vec<(String, Phrase)>,
}

impl Default for Disqualifier {
    fn default() -> Self {
        Self::from_sets(KeywordSets::default())
    }
}

impl Disqualifier {
    pub fn from_sets(sets: KeywordSets) -> Self {
        let compile = |items: Vec<String>| -> Vec<(String, Phrase)> {
            items
                .into_iter()
                .filter_map(|p| {
                    let toks = tokenize(&p);
                    if toks.is_empty() {
                        None
                    } else {
                        Some((p, toks))
                    }
                })
                .collect()
        };
        Self {
            sets: vec![
                (DisqualifyCategory::B2b, compile(sets.b2b)),
                (DisqualifyCategory::Crypto, compile(sets.crypto)),
                (DisqualifyCategory::Services, compile(sets.services)),
                (DisqualifyCategory::Job, compile(sets.job)),
            ],
            consumer_positive: compile(sets.consumer_positive),
        }
    }

    /// Load overridden keyword sets from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let sets: KeywordSets = toml::from_str(toml_str)?;
        Ok(Self::from_sets(sets))
    }

    /// Evaluate the concatenated title + description text. Synchronous, no I/O.
    pub fn evaluate(&self, text: &str) -> DisqualifyResult {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return DisqualifyResult::passed();
        }

        let positive_spans = match_spans_many(&tokens, &self.consumer_positive);

        for (category, phrases) in &self.sets {
            let mut first_phrase: Option<&str> = None;
            let mut matched_spans: Vec<Span> = Vec::new();
            for (raw, phrase) in phrases {
                let spans = match_spans(&tokens, phrase);
                if !spans.is_empty() {
                    if first_phrase.is_none() {
                        first_phrase = Some(raw);
                    }
                    matched_spans.extend(spans);
                }
            }
            let Some(phrase) = first_phrase else { continue };

            // Consumer-positive suppression: a positive term outside every
            // matched span of this category cancels the rejection.
            let suppressed = positive_spans
                .iter()
                .any(|p| !matched_spans.iter().any(|m| m.overlaps(p)));
            if suppressed {
                tracing::debug!(
                    target: "disqualify",
                    category = category.as_str(),
                    phrase,
                    "rejection suppressed by consumer-positive term"
                );
                continue;
            }

            return DisqualifyResult::rejected(*category, phrase);
        }

        DisqualifyResult::passed()
    }
}

/* ----------------------------
Tokenization & matching
---------------------------- */

/// Lowercased word tokens; `\w` boundaries, Unicode-aware.
fn tokenize(input: &str) -> Vec<String> {
    static RE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?u)\b\w+\b").expect("tokenizer regex"));
    RE_WORD
        .find_iter(input)
        .map(|m| m.as_str().to_lowercase())
        .collect()
}

/// All spans where `phrase` occurs as consecutive tokens.
fn match_spans(tokens: &[String], phrase: &[String]) -> Vec<Span> {
    let n = phrase.len();
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    let mut out = Vec::new();
    for start in 0..=(tokens.len() - n) {
        if tokens[start..start + n]
            .iter()
            .zip(phrase)
            .all(|(a, b)| a == b)
        {
            out.push(Span {
                start,
                end: start + n,
            });
        }
    }
    out
}

fn match_spans_many(tokens: &[String], phrases: &[(String, Phrase)]) -> Vec<Span> {
    let mut out = Vec::new();
    for (_, phrase) in phrases {
        out.extend(match_spans(tokens, phrase));
    }
    out
}

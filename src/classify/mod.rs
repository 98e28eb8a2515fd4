// src/classify/mod.rs
//! LLM classifier capability: the engine consumes a thesis classification, it
//! never computes one. Providers are injected behind `ThesisClassifier` so
//! pipeline logic can be exercised with mocks.

pub mod budget;
pub mod openai;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Thesis category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThesisCategory {
    ConsumerCpg,
    ConsumerHealthTech,
    TravelHospitality,
    ConsumerMarketplace,
    Other,
}

impl ThesisCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThesisCategory::ConsumerCpg => "consumer_cpg",
            ThesisCategory::ConsumerHealthTech => "consumer_health_tech",
            ThesisCategory::TravelHospitality => "travel_hospitality",
            ThesisCategory::ConsumerMarketplace => "consumer_marketplace",
            ThesisCategory::Other => "other",
        }
    }

    /// Lenient parse for provider output; anything unrecognized is `Other`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "consumer_cpg" | "cpg" => Self::ConsumerCpg,
            "consumer_health_tech" | "health_tech" => Self::ConsumerHealthTech,
            "travel_hospitality" | "travel" | "hospitality" => Self::TravelHospitality,
            "consumer_marketplace" | "marketplace" => Self::ConsumerMarketplace,
            _ => Self::Other,
        }
    }
}

/// Thesis-fit verdict for one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThesisClassification {
    /// Fit score in [0.0, 1.0].
    pub score: f32,
    pub category: ThesisCategory,
    pub rationale: String,
    pub model_version: String,
}

impl ThesisClassification {
    pub fn new(
        score: f32,
        category: ThesisCategory,
        rationale: impl Into<String>,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            category,
            rationale: rationale.into(),
            model_version: model_version.into(),
        }
    }
}

/// Classifier failure modes. All of them leave the signal retryable; none of
/// them may be conflated with a low-score rejection.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier is disabled")]
    Disabled,
    #[error("daily classification budget exhausted")]
    QuotaExhausted,
    #[error("classifier request timed out")]
    Timeout,
    #[error("classifier returned a malformed response: {0}")]
    MalformedResponse(String),
    #[error("classifier API returned status {0}")]
    Api(u16),
    #[error("classifier transport error: {0}")]
    Transport(String),
}

/// Capability interface; see the provider implementations in `openai` and the
/// cost-control wrapper in `budget`.
#[async_trait::async_trait]
pub trait ThesisClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<ThesisClassification, ClassifyError>;
    /// Provider/model identifier for diagnostics and audit rows.
    fn model_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynClassifier = Arc<dyn ThesisClassifier>;

/// Returns `Disabled` always; used when no provider is configured.
pub struct DisabledClassifier;

#[async_trait::async_trait]
impl ThesisClassifier for DisabledClassifier {
    async fn classify(&self, _text: &str) -> Result<ThesisClassification, ClassifyError> {
        Err(ClassifyError::Disabled)
    }
    fn model_name(&self) -> &'static str {
        "disabled"
    }
}

/// Deterministic classifier for tests and local runs. Counts calls so tests can
/// assert the stage-1 short-circuit without any network mock.
pub struct MockClassifier {
    fixed: Result<ThesisClassification, fn() -> ClassifyError>,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn fixed(score: f32, category: ThesisCategory) -> Self {
        Self {
            fixed: Ok(ThesisClassification::new(
                score,
                category,
                "mock rationale",
                "mock-1",
            )),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that fails every call with the given error constructor.
    pub fn failing(err: fn() -> ClassifyError) -> Self {
        Self {
            fixed: Err(err),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ThesisClassifier for MockClassifier {
    async fn classify(&self, _text: &str) -> Result<ThesisClassification, ClassifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.fixed {
            Ok(c) => Ok(c.clone()),
            Err(mk) => Err(mk()),
        }
    }
    fn model_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_parse_is_lenient() {
        assert_eq!(ThesisCategory::parse("consumer_cpg"), ThesisCategory::ConsumerCpg);
        assert_eq!(ThesisCategory::parse("Consumer CPG"), ThesisCategory::ConsumerCpg);
        assert_eq!(
            ThesisCategory::parse("travel-hospitality"),
            ThesisCategory::TravelHospitality
        );
        assert_eq!(ThesisCategory::parse("b2b saas"), ThesisCategory::Other);
    }

    #[test]
    fn classification_clamps_score() {
        let c = ThesisClassification::new(1.7, ThesisCategory::Other, "r", "m");
        assert_eq!(c.score, 1.0);
        let c = ThesisClassification::new(-0.2, ThesisCategory::Other, "r", "m");
        assert_eq!(c.score, 0.0);
    }

    #[tokio::test]
    async fn mock_counts_calls() {
        let m = MockClassifier::fixed(0.9, ThesisCategory::ConsumerCpg);
        assert_eq!(m.calls(), 0);
        let _ = m.classify("anything").await.unwrap();
        let _ = m.classify("anything else").await.unwrap();
        assert_eq!(m.calls(), 2);
    }
}

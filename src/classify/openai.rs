// src/classify/openai.rs
//! OpenAI-backed thesis classifier. Requires `OPENAI_API_KEY`.
//!
//! The provider is asked for a strict JSON object; anything else is a
//! `MalformedResponse`, which the pipeline records as a retryable
//! classification error.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{ClassifyError, ThesisCategory, ThesisClassification, ThesisClassifier};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

pub struct OpenAiClassifier {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClassifier {
    /// `model_override`: pass Some("gpt-4o") to override; defaults to gpt-4o-mini.
    pub fn new(api_key: String, model_override: Option<&str>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("consumer-signal-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(15))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model_override.unwrap_or(DEFAULT_MODEL).to_string(),
        }
    }

    pub fn from_env(model_override: Option<&str>) -> Self {
        Self::new(
            std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            model_override,
        )
    }
}

const SYSTEM_PROMPT: &str = "You score early consumer-company signals against an \
investment thesis covering consumer CPG, consumer health tech, travel and \
hospitality, and consumer marketplaces. Reply with ONLY a JSON object: \
{\"score\": <0.0-1.0>, \"category\": \"consumer_cpg\"|\"consumer_health_tech\"|\
\"travel_hospitality\"|\"consumer_marketplace\"|\"other\", \"rationale\": \
\"<one sentence>\"}.";

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMsg,
}

#[derive(Deserialize)]
struct ChoiceMsg {
    content: String,
}

/// Shape the model is instructed to emit.
#[derive(Deserialize)]
struct RawVerdict {
    score: f32,
    category: String,
    #[serde(default)]
    rationale: String,
}

/// Parse the model's reply, tolerating surrounding prose or code fences.
fn parse_verdict(content: &str, model: &str) -> Result<ThesisClassification, ClassifyError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &content[s..=e],
        _ => {
            return Err(ClassifyError::MalformedResponse(format!(
                "no JSON object in reply: {:.120}",
                content
            )))
        }
    };
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;
    if !raw.score.is_finite() {
        return Err(ClassifyError::MalformedResponse(
            "non-finite score".to_string(),
        ));
    }
    Ok(ThesisClassification::new(
        raw.score,
        ThesisCategory::parse(&raw.category),
        raw.rationale,
        model,
    ))
}

#[async_trait::async_trait]
impl ThesisClassifier for OpenAiClassifier {
    async fn classify(&self, text: &str) -> Result<ThesisClassification, ClassifyError> {
        if self.api_key.is_empty() {
            return Err(ClassifyError::Disabled);
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: text,
                },
            ],
            temperature: 0.1,
            max_tokens: 200,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifyError::Timeout
                } else {
                    ClassifyError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ClassifyError::QuotaExhausted);
        }
        if !status.is_success() {
            return Err(ClassifyError::Api(status.as_u16()));
        }

        let body: Resp = resp
            .json()
            .await
            .map_err(|e| ClassifyError::MalformedResponse(e.to_string()))?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");
        parse_verdict(content, &self.model)
    }

    fn model_name(&self) -> &'static str {
        "openai"
    }
}

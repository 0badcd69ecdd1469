//! Weather description classification via a chat-completion model.
//!
//! The model is asked for exactly one category name. Whatever comes back is
//! validated against [`Category::classifiable`]; anything else, and any
//! transport failure, becomes [`Category::Unknown`].

use std::{fmt::Debug, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Config, error::InsightError, model::Category, provider::truncate_body};

/// Sampling temperature sent with every classification request.
pub const CLASSIFY_TEMPERATURE: f32 = 0.0;
/// Output cap; one category name fits comfortably.
pub const CLASSIFY_MAX_TOKENS: u32 = 10;

/// A completion endpoint that turns a prompt into free text.
#[async_trait]
pub trait LanguageModel: Send + Sync + Debug {
    async fn complete(&self, prompt: &str) -> Result<String, InsightError>;
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Debug, Clone)]
pub struct OpenAiChat {
    http: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(
        api_key: String,
        model: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self, InsightError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            InsightError::Configuration(format!("Failed to build HTTP client: {e}"))
        })?;

        Ok(Self { http, api_key, model, base_url: base_url.trim_end_matches('/').to_string() })
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String, InsightError> {
        let req = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: CLASSIFY_TEMPERATURE,
            max_tokens: CLASSIFY_MAX_TOKENS,
        };

        let res = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| InsightError::Classification(format!("request failed: {e}")))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| InsightError::Classification(format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(InsightError::Classification(format!(
                "model endpoint returned status {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| InsightError::Classification(format!("malformed response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| InsightError::Classification("response contained no completion".into()))
    }
}

/// Maps weather descriptions onto [`Category`].
#[derive(Debug)]
pub struct Classifier {
    model: Box<dyn LanguageModel>,
}

impl Classifier {
    pub fn new(model: Box<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Classify, reporting model failures to the caller.
    ///
    /// A reachable model that answers with an unexpected word is not an
    /// error: the answer is simply `Unknown`.
    pub async fn try_classify(&self, description: &str) -> Result<Category, InsightError> {
        let prompt = build_prompt(description);
        let raw = self.model.complete(&prompt).await?;
        let category = parse_category(&raw);

        if category == Category::Unknown {
            warn!(description = %description, response = %raw, "model answered outside the category set");
        } else {
            debug!(description = %description, category = %category, "classified");
        }

        Ok(category)
    }

    /// Classify, degrading every failure to `Unknown`.
    pub async fn classify(&self, description: &str) -> Category {
        match self.try_classify(description).await {
            Ok(category) => category,
            Err(e) => {
                warn!(error = %e, "classification failed; using Unknown");
                Category::Unknown
            }
        }
    }
}

/// Build the classifier from the LLM section of the config.
pub fn classifier_from_config(config: &Config) -> Result<Classifier, InsightError> {
    let api_key = config.llm_api_key().ok_or_else(|| {
        InsightError::Configuration(
            "No language-model API key configured.\n\
             Hint: set OPENAI_API_KEY or add `api_key` under [llm] in the config file."
                .to_string(),
        )
    })?;

    let chat = OpenAiChat::new(
        api_key.to_string(),
        config.llm_model().to_string(),
        config.llm_base_url(),
        config.timeout(),
    )?;

    Ok(Classifier::new(Box::new(chat)))
}

/// Deterministic instruction prompt listing the allowed categories.
pub fn build_prompt(description: &str) -> String {
    let allowed = Category::classifiable()
        .iter()
        .map(Category::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Classify the following weather description as exactly one of: {allowed}.\n\
         Reply with the category name only.\n\
         Description: {}\n\
         Answer:",
        description.trim()
    )
}

/// Validate a raw completion against the allowed category names.
///
/// Surrounding whitespace, quotes and a trailing full stop are tolerated;
/// the name itself must match exactly.
pub fn parse_category(raw: &str) -> Category {
    let cleaned = raw.trim().trim_matches(|c| c == '"' || c == '\'').trim_end_matches('.').trim();

    Category::from_label(cleaned)
}

use serde::Deserialize;
use serde_json::json;

use super::http::{RetryPolicy, send_with_retry};
use super::reply::{parse_pairs_reply, render_batch_prompt};
use super::{BatchFuture, BatchOutcome, BatchProvider, TranslationPair};
use crate::error::ProviderError;
use crate::languages::LanguagePair;

const NAME: &str = "openai";
pub(crate) const DEFAULT_URL: &str = "https://api.openai.com/v1";
pub(crate) const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone)]
pub struct OpenAI {
    client: reqwest::Client,
    url: String,
    key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAI {
    pub fn new(client: reqwest::Client, url: &str, key: &str) -> Self {
        let url = if url.trim().is_empty() {
            DEFAULT_URL
        } else {
            url.trim()
        };
        Self {
            client,
            url: url.trim_end_matches('/').to_string(),
            key: key.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        if !model.trim().is_empty() {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(
        &self,
        texts: &[String],
        languages: LanguagePair,
    ) -> Result<Vec<TranslationPair>, ProviderError> {
        let prompt = render_batch_prompt(texts, languages).map_err(|err| ProviderError::Prompt {
            provider: NAME,
            reason: err.to_string(),
        })?;
        let url = format!("{}/chat/completions", self.url);
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        });

        let reply = send_with_retry(NAME, self.retry, || {
            self.client.post(&url).bearer_auth(&self.key).json(&body)
        })
        .await?;
        if !reply.status.is_success() {
            return Err(ProviderError::Status {
                provider: NAME,
                status: reply.status.as_u16(),
                body: extract_openai_error(&reply.body).unwrap_or(reply.body),
            });
        }
        let text = extract_reply_text(&reply.body)?;
        parse_pairs_reply(&text).map_err(|reason| ProviderError::parse(NAME, reason))
    }
}

impl BatchProvider for OpenAI {
    fn name(&self) -> &'static str {
        NAME
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        languages: LanguagePair,
    ) -> BatchFuture<'a> {
        Box::pin(async move { BatchOutcome::from_result(self.request(texts, languages).await) })
    }
}

fn extract_reply_text(body: &str) -> Result<String, ProviderError> {
    let payload: OpenAIResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::parse(NAME, format!("response JSON: {}", err)))?;
    payload
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| ProviderError::parse(NAME, "no message content returned"))
}

fn extract_openai_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<OpenAIError>,
    }

    #[derive(Deserialize)]
    struct OpenAIError {
        message: Option<String>,
        #[serde(rename = "type")]
        kind: Option<String>,
        code: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let parts = [
        error.message,
        error.kind.map(|kind| format!("type: {}", kind)),
        error.code.map(|code| format!("code: {}", code)),
    ]
    .into_iter()
    .flatten()
    .filter(|part| !part.trim().is_empty())
    .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

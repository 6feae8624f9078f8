use serde::Deserialize;
use serde_json::json;

use super::http::{RetryPolicy, send_with_retry};
use super::reply::{parse_pairs_reply, render_batch_prompt};
use super::{BatchFuture, BatchOutcome, BatchProvider, TranslationPair};
use crate::error::ProviderError;
use crate::languages::LanguagePair;

const NAME: &str = "gemini";
pub(crate) const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
pub(crate) const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Debug, Clone)]
pub struct Gemini {
    client: reqwest::Client,
    url: String,
    key: String,
    model: String,
    retry: RetryPolicy,
}

impl Gemini {
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
        let url = format!("{}/{}:generateContent", self.url, self.model);
        let body = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{"text": prompt}]
                }
            ],
            "generationConfig": {
                "temperature": 0.0
            }
        });

        let reply = send_with_retry(NAME, self.retry, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.key)
                .json(&body)
        })
        .await?;
        if !reply.status.is_success() {
            return Err(ProviderError::Status {
                provider: NAME,
                status: reply.status.as_u16(),
                body: extract_gemini_error(&reply.body).unwrap_or(reply.body),
            });
        }
        let text = extract_reply_text(&reply.body)?;
        parse_pairs_reply(&text).map_err(|reason| ProviderError::parse(NAME, reason))
    }
}

impl BatchProvider for Gemini {
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
    let payload: GeminiResponse = serde_json::from_str(body)
        .map_err(|err| ProviderError::parse(NAME, format!("response JSON: {}", err)))?;
    let content = payload
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .ok_or_else(|| ProviderError::parse(NAME, "no candidate returned"))?;
    let text = content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        return Err(ProviderError::parse(NAME, "candidate has no text"));
    }
    Ok(text)
}

fn extract_gemini_error(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: Option<GeminiError>,
    }

    #[derive(Deserialize)]
    struct GeminiError {
        message: Option<String>,
        status: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    let error = parsed.error?;
    let mut parts = Vec::new();
    if let Some(message) = error.message
        && !message.trim().is_empty()
    {
        parts.push(message);
    }
    if let Some(status) = error.status
        && !status.trim().is_empty()
    {
        parts.push(format!("status: {}", status));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" | "))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use insta::assert_snapshot;

    #[test]
    fn joins_candidate_parts() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [
                    {"text": "```json\n[[\"Hello\", "},
                    {"text": "\"你好\"]]\n```"}
                ]}
            }]
        }"#;
        let text = extract_reply_text(body).unwrap();
        let pairs = parse_pairs_reply(&text).unwrap();
        assert_eq!(pairs, vec![TranslationPair::new("Hello", "你好")]);
    }

    #[test]
    fn blocked_prompt_has_no_candidate() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_reply_text(body).unwrap_err();
        assert!(matches!(err, ProviderError::Parse { .. }));
    }

    #[test]
    fn error_body_is_summarised() {
        let body = r#"{"error": {"code": 403, "message": "API key not valid", "status": "PERMISSION_DENIED"}}"#;
        assert_snapshot!(
            extract_gemini_error(body).unwrap(),
            @"API key not valid | status: PERMISSION_DENIED"
        );
        assert_eq!(extract_gemini_error("<html>"), None);
    }
}

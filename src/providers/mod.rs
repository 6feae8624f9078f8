use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

use crate::error::ProviderError;
use crate::languages::LanguagePair;
use crate::settings::Settings;

mod azure;
mod gemini;
mod http;
mod openai;
mod reply;
mod web;

pub use azure::AzureTranslator;
pub use gemini::Gemini;
pub use http::{RetryPolicy, build_client};
pub use openai::OpenAI;
pub use reply::{parse_pairs_reply, render_batch_prompt};
pub use web::{IRREPARABLE_TRANSLATION, WebTranslate, strip_control_characters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Web,
    Azure,
    Gemini,
    OpenAI,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Web => "web",
            ProviderKind::Azure => "azure",
            ProviderKind::Gemini => "gemini",
            ProviderKind::OpenAI => "openai",
        }
    }

    pub fn from_name(name: &str) -> Option<ProviderKind> {
        match name.trim().to_lowercase().as_str() {
            "web" | "google" => Some(ProviderKind::Web),
            "azure" | "microsoft" => Some(ProviderKind::Azure),
            "gemini" => Some(ProviderKind::Gemini),
            "openai" | "gpt" => Some(ProviderKind::OpenAI),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationPair {
    pub source: String,
    pub translation: String,
}

impl TranslationPair {
    pub fn new(source: impl Into<String>, translation: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            translation: translation.into(),
        }
    }
}

/// Result of a whole-batch attempt. A provider either answers for the batch or
/// fails; the orchestrator treats an empty success like a failure.
#[derive(Debug)]
pub enum BatchOutcome {
    Success(Vec<TranslationPair>),
    Failure(ProviderError),
}

impl BatchOutcome {
    pub fn from_result(result: Result<Vec<TranslationPair>, ProviderError>) -> Self {
        match result {
            Ok(pairs) => BatchOutcome::Success(pairs),
            Err(err) => BatchOutcome::Failure(err),
        }
    }
}

pub type BatchFuture<'a> = Pin<Box<dyn Future<Output = BatchOutcome> + Send + 'a>>;
pub type TextFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ProviderError>> + Send + 'a>>;

/// A backend that translates an ordered list of texts in one go.
pub trait BatchProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn translate_batch<'a>(&'a self, texts: &'a [String], languages: LanguagePair)
    -> BatchFuture<'a>;
}

/// A backend that translates one text per call. Used as the last resort for blocks
/// the batch stage and the cache could not answer.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn translate_text<'a>(&'a self, text: &'a str, languages: LanguagePair) -> TextFuture<'a>;
}

/// Builds the ordered batch fallback chain from settings. Providers that lack an
/// endpoint or key are skipped.
pub fn build_chain(settings: &Settings, client: &reqwest::Client) -> Vec<Arc<dyn BatchProvider>> {
    let retry = RetryPolicy::new(settings.http.max_retries);
    let mut chain: Vec<Arc<dyn BatchProvider>> = Vec::new();
    for name in &settings.chain {
        let Some(kind) = ProviderKind::from_name(name) else {
            warn!(provider = %name, "unknown provider in chain; skipped");
            continue;
        };
        match kind {
            ProviderKind::Web => {
                chain.push(Arc::new(build_web(settings, client)));
            }
            ProviderKind::Azure => match settings.azure.key.as_deref() {
                Some(key) => chain.push(Arc::new(
                    AzureTranslator::new(client.clone(), &settings.azure.url, key)
                        .with_region(&settings.azure.region),
                )),
                None => warn!("azure translator key missing; provider skipped"),
            },
            ProviderKind::Gemini => match settings.gemini.key.as_deref() {
                Some(key) => chain.push(Arc::new(
                    Gemini::new(client.clone(), &settings.gemini.url, key)
                        .with_model(&settings.gemini.model)
                        .with_retry(retry),
                )),
                None => warn!("gemini key missing; provider skipped"),
            },
            ProviderKind::OpenAI => match settings.openai.key.as_deref() {
                Some(key) => chain.push(Arc::new(
                    OpenAI::new(client.clone(), &settings.openai.url, key)
                        .with_model(&settings.openai.model)
                        .with_retry(retry),
                )),
                None => warn!("openai key missing; provider skipped"),
            },
        }
    }
    chain
}

pub fn build_web(settings: &Settings, client: &reqwest::Client) -> WebTranslate {
    WebTranslate::new(client.clone(), &settings.web.url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for kind in [
            ProviderKind::Web,
            ProviderKind::Azure,
            ProviderKind::Gemini,
            ProviderKind::OpenAI,
        ] {
            assert_eq!(ProviderKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ProviderKind::from_name(" GPT "), Some(ProviderKind::OpenAI));
        assert_eq!(ProviderKind::from_name("deepl"), None);
    }

    #[test]
    fn chain_skips_unconfigured_providers() {
        let mut settings = Settings::default();
        settings.chain = vec![
            "gemini".to_string(),
            "azure".to_string(),
            "openai".to_string(),
            "web".to_string(),
            "nope".to_string(),
        ];
        settings.gemini.key = Some("g-key".to_string());
        settings.azure.key = None;
        settings.openai.key = None;
        let client = reqwest::Client::new();
        let chain = build_chain(&settings, &client);
        let names = chain.iter().map(|p| p.name()).collect::<Vec<_>>();
        assert_eq!(names, vec!["gemini", "web"]);
    }
}

use serde::Deserialize;
use serde_json::json;

use super::http::{RetryPolicy, send_with_retry};
use super::{BatchFuture, BatchOutcome, BatchProvider, TranslationPair};
use crate::error::ProviderError;
use crate::languages::{Dialect, LanguagePair};

const NAME: &str = "azure";
pub(crate) const DEFAULT_URL: &str = "https://api.cognitive.microsofttranslator.com/translate";
pub(crate) const DEFAULT_REGION: &str = "eastus";

/// Commercial batch translation API. The response is a parallel array in input
/// order.
#[derive(Debug, Clone)]
pub struct AzureTranslator {
    client: reqwest::Client,
    url: String,
    key: String,
    region: String,
    retry: RetryPolicy,
}

impl AzureTranslator {
    pub fn new(client: reqwest::Client, url: &str, key: &str) -> Self {
        let url = if url.trim().is_empty() {
            DEFAULT_URL
        } else {
            url.trim()
        };
        Self {
            client,
            url: url.to_string(),
            key: key.to_string(),
            region: DEFAULT_REGION.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_region(mut self, region: &str) -> Self {
        if !region.trim().is_empty() {
            self.region = region.trim().to_string();
        }
        self
    }

    async fn request(
        &self,
        texts: &[String],
        languages: LanguagePair,
    ) -> Result<Vec<TranslationPair>, ProviderError> {
        let from = languages.source_code(Dialect::Api);
        let to = languages.target_code(Dialect::Api);
        let body = texts
            .iter()
            .map(|text| json!({ "text": text }))
            .collect::<Vec<_>>();
        let trace_id = uuid::Uuid::new_v4().to_string();

        let reply = send_with_retry(NAME, self.retry, || {
            self.client
                .post(&self.url)
                .query(&[("api-version", "3.0"), ("from", from), ("to", to)])
                .header("Ocp-Apim-Subscription-Key", &self.key)
                .header("Ocp-Apim-Subscription-Region", &self.region)
                .header("X-ClientTraceId", &trace_id)
                .json(&body)
        })
        .await?;
        let text = reply.into_success(NAME)?;
        zip_translations(texts, &text)
    }
}

#[derive(Debug, Deserialize)]
struct AzureItem {
    translations: Vec<AzureTranslation>,
}

#[derive(Debug, Deserialize)]
struct AzureTranslation {
    text: String,
}

/// Pairs inputs with outputs positionally. A length mismatch means the response
/// cannot be aligned and the whole batch is rejected.
pub(crate) fn zip_translations(
    texts: &[String],
    body: &str,
) -> Result<Vec<TranslationPair>, ProviderError> {
    let items: Vec<AzureItem> = serde_json::from_str(body)
        .map_err(|err| ProviderError::parse(NAME, err.to_string()))?;
    if items.len() != texts.len() {
        return Err(ProviderError::LengthMismatch {
            provider: NAME,
            expected: texts.len(),
            got: items.len(),
        });
    }
    texts
        .iter()
        .zip(items)
        .map(|(source, item)| {
            let translation = item
                .translations
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::parse(NAME, "item without translations"))?;
            Ok(TranslationPair::new(source.clone(), translation.text))
        })
        .collect()
}

impl BatchProvider for AzureTranslator {
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

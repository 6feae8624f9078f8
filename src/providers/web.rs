use regex::Regex;
use reqwest::StatusCode;
use std::sync::LazyLock;
use unicode_general_category::{GeneralCategory, get_general_category};

use super::http::{RetryPolicy, send_with_retry};
use super::{BatchFuture, BatchOutcome, BatchProvider, TextFuture, TextProvider, TranslationPair};
use crate::error::ProviderError;
use crate::languages::{Dialect, LanguagePair};

const NAME: &str = "web";
pub(crate) const DEFAULT_URL: &str = "https://translate.google.com/m";
const USER_AGENT: &str = "Mozilla/4.0 (compatible;MSIE 6.0;Windows NT 5.1;SV1;.NET CLR 1.1.4322;.NET CLR 2.0.50727;.NET CLR 3.0.04506.30)";

/// Literal output for texts the web endpoint rejects with HTTP 400.
pub const IRREPARABLE_TRANSLATION: &str = "IRREPARABLE TRANSLATION ERROR";

static RESULT_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)class="(?:t0|result-container)">(.*?)<"#).expect("static regex")
});

/// Scraped single-text translate page.
#[derive(Debug, Clone)]
pub struct WebTranslate {
    client: reqwest::Client,
    url: String,
}

impl WebTranslate {
    pub fn new(client: reqwest::Client, url: &str) -> Self {
        let url = if url.trim().is_empty() {
            DEFAULT_URL
        } else {
            url.trim()
        };
        Self {
            client,
            url: url.to_string(),
        }
    }

    async fn request(&self, text: &str, languages: LanguagePair) -> Result<String, ProviderError> {
        let source = languages.source_code(Dialect::Web);
        let target = languages.target_code(Dialect::Web);
        let reply = send_with_retry(NAME, RetryPolicy::none(), || {
            self.client
                .get(&self.url)
                .query(&[("sl", source), ("tl", target), ("hl", target), ("q", text)])
                .header(reqwest::header::USER_AGENT, USER_AGENT)
        })
        .await?;
        parse_web_response(reply.status, &reply.body)
    }
}

/// Interprets a translate page response. HTTP 400 becomes the irreparable marker
/// instead of an error so one rejected string cannot sink a batch.
pub(crate) fn parse_web_response(status: StatusCode, body: &str) -> Result<String, ProviderError> {
    if status == StatusCode::BAD_REQUEST {
        return Ok(IRREPARABLE_TRANSLATION.to_string());
    }
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider: NAME,
            status: status.as_u16(),
            body: String::new(),
        });
    }
    let captured = RESULT_MARKER
        .captures(body)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ProviderError::parse(NAME, "result marker not found"))?;
    let decoded = html_escape::decode_html_entities(captured.as_str());
    Ok(strip_control_characters(&decoded))
}

/// Removes every character in the Unicode "Other" categories: Cc, Cf, Cs, Co and
/// Cn (which includes unassigned code points).
pub fn strip_control_characters(text: &str) -> String {
    text.chars().filter(|ch| !is_other_category(*ch)).collect()
}

fn is_other_category(ch: char) -> bool {
    matches!(
        get_general_category(ch),
        GeneralCategory::Control
            | GeneralCategory::Format
            | GeneralCategory::Surrogate
            | GeneralCategory::PrivateUse
            | GeneralCategory::Unassigned
    )
}

impl TextProvider for WebTranslate {
    fn name(&self) -> &'static str {
        NAME
    }

    fn translate_text<'a>(&'a self, text: &'a str, languages: LanguagePair) -> TextFuture<'a> {
        Box::pin(self.request(text, languages))
    }
}

/// When placed in the batch chain the web provider walks the batch one text at a
/// time; the first hard failure fails the whole batch.
impl BatchProvider for WebTranslate {
    fn name(&self) -> &'static str {
        NAME
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        languages: LanguagePair,
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            let mut pairs = Vec::with_capacity(texts.len());
            for text in texts {
                match self.request(text, languages).await {
                    Ok(translation) => pairs.push(TranslationPair::new(text.clone(), translation)),
                    Err(err) => return BatchOutcome::Failure(err),
                }
            }
            BatchOutcome::Success(pairs)
        })
    }
}

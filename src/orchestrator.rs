//! Translation of an ordered list of text blocks across the provider chain.
//!
//! The batch providers are tried in order until one answers. Each block then takes the
//! next pair of that answer when its source matches, otherwise the cache, otherwise the
//! single-text provider. Every resolved translation is written back to the cache.

use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::TranslationCache;
use crate::error::PipelineError;
use crate::languages::LanguagePair;
use crate::ocr::{TextBlock, TranslatedBlock};
use crate::pipeline::{ProgressReporter, cancellable};
use crate::providers::{BatchOutcome, BatchProvider, TextProvider, TranslationPair};

pub struct Orchestrator {
    chain: Vec<Arc<dyn BatchProvider>>,
    fallback: Arc<dyn TextProvider>,
    cache: TranslationCache,
}

/// Where a block's translation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Batch,
    Cache,
    Single,
}

impl Orchestrator {
    pub fn new(
        chain: Vec<Arc<dyn BatchProvider>>,
        fallback: Arc<dyn TextProvider>,
        cache: TranslationCache,
    ) -> Self {
        Self {
            chain,
            fallback,
            cache,
        }
    }

    pub fn cache(&self) -> &TranslationCache {
        &self.cache
    }

    /// Returns one translated block per input block, in input order.
    ///
    /// Fails only on cancellation, or with `ServiceUnavailable` when there was text to
    /// translate and not a single block could be resolved by any path.
    pub async fn translate(
        &self,
        blocks: Vec<TextBlock>,
        languages: LanguagePair,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranslatedBlock>, PipelineError> {
        if blocks.is_empty() {
            return Ok(Vec::new());
        }

        let texts = blocks
            .iter()
            .filter(|block| !block.source_text.is_empty())
            .map(|block| block.source_text.clone())
            .collect::<Vec<_>>();
        let mut batch = if texts.is_empty() {
            VecDeque::new()
        } else {
            self.translate_batch(&texts, languages, progress, cancel)
                .await?
        };

        let mut translated = Vec::with_capacity(blocks.len());
        let mut resolved = 0usize;
        let mut from_batch = 0usize;
        for block in blocks {
            if block.source_text.is_empty() {
                translated.push(TranslatedBlock::new(block, ""));
                continue;
            }
            let answer = self
                .resolve_block(&block.source_text, &mut batch, languages, cancel)
                .await?;
            match answer {
                Some((translation, resolution)) => {
                    self.remember(&block.source_text, &translation).await;
                    resolved += 1;
                    if resolution == Resolution::Batch {
                        from_batch += 1;
                    }
                    translated.push(TranslatedBlock::new(block, translation));
                }
                None => translated.push(TranslatedBlock::new(block, "")),
            }
        }

        if !texts.is_empty() && resolved == 0 {
            warn!(blocks = texts.len(), "no block could be translated");
            return Err(PipelineError::ServiceUnavailable);
        }
        progress.emit(format!(
            "resolved {} of {} texts ({} from batch)",
            resolved,
            texts.len(),
            from_batch
        ));
        Ok(translated)
    }

    /// Cache reads and writes touch the database, so they run on the blocking pool.
    async fn cached(&self, source_text: &str) -> Option<String> {
        let cache = self.cache.clone();
        let text = source_text.to_string();
        tokio::task::spawn_blocking(move || cache.lookup(&text))
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "cache lookup task failed");
                None
            })
    }

    async fn remember(&self, source_text: &str, translation: &str) {
        let cache = self.cache.clone();
        let (text, translation) = (source_text.to_string(), translation.to_string());
        if let Err(err) = tokio::task::spawn_blocking(move || cache.store(&text, &translation)).await {
            warn!(error = %err, "cache store task failed");
        }
    }

    /// Walks the chain until a provider returns a non-empty answer.
    async fn translate_batch(
        &self,
        texts: &[String],
        languages: LanguagePair,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<VecDeque<TranslationPair>, PipelineError> {
        for provider in &self.chain {
            let name = provider.name();
            progress.emit(format!("submitting {} texts to {}", texts.len(), name));
            let outcome = cancellable(cancel, provider.translate_batch(texts, languages)).await?;
            match outcome {
                BatchOutcome::Success(pairs) if !pairs.is_empty() => {
                    progress.emit(format!("{} returned {} translations", name, pairs.len()));
                    return Ok(pairs.into());
                }
                BatchOutcome::Success(_) => {
                    warn!(provider = name, "empty batch answer");
                    progress.emit(format!("{} returned nothing", name));
                }
                BatchOutcome::Failure(err) => {
                    warn!(provider = name, error = %err, "batch translation failed");
                    progress.emit(format!("{} failed", name));
                }
            }
        }
        if !self.chain.is_empty() {
            progress.emit("batch translation unavailable, translating block by block");
        }
        Ok(VecDeque::new())
    }

    async fn resolve_block(
        &self,
        source_text: &str,
        batch: &mut VecDeque<TranslationPair>,
        languages: LanguagePair,
        cancel: &CancellationToken,
    ) -> Result<Option<(String, Resolution)>, PipelineError> {
        if let Some(pair) = batch.pop_front() {
            if pair.source == source_text {
                return Ok(Some((pair.translation, Resolution::Batch)));
            }
            debug!(expected = source_text, got = %pair.source, "batch answer out of order");
        }

        if let Some(hit) = self.cached(source_text).await {
            return Ok(Some((hit, Resolution::Cache)));
        }

        let result = cancellable(cancel, self.fallback.translate_text(source_text, languages)).await?;
        match result {
            Ok(translation) => Ok(Some((translation, Resolution::Single))),
            Err(err) => {
                warn!(provider = self.fallback.name(), error = %err, "single-text translation failed");
                Ok(None)
            }
        }
    }
}

use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ExtractError, ProviderError};
use crate::languages::{Language, LanguagePair};
use crate::ocr::{ExtractFuture, TextBlock, TextExtractor};
use crate::providers::{
    BatchFuture, BatchOutcome, BatchProvider, TextFuture, TextProvider, TranslationPair,
};

/// One block per text, stacked as 100x20 rows.
pub(crate) fn blocks(texts: &[&str]) -> Vec<TextBlock> {
    texts
        .iter()
        .enumerate()
        .map(|(idx, text)| TextBlock::from_rect(0.0, idx as f32 * 20.0, 100.0, 20.0, *text))
        .collect()
}

fn unavailable(provider: &'static str) -> ProviderError {
    ProviderError::Status {
        provider,
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub(crate) struct FakeBatch {
    name: &'static str,
    answer: Option<Vec<TranslationPair>>,
    calls: AtomicUsize,
    last_texts: Mutex<Vec<String>>,
}

impl FakeBatch {
    pub(crate) fn answering(name: &'static str, pairs: &[(&str, &str)]) -> Arc<Self> {
        let pairs = pairs
            .iter()
            .map(|(source, translation)| TranslationPair::new(*source, *translation))
            .collect();
        Arc::new(Self {
            name,
            answer: Some(pairs),
            calls: AtomicUsize::new(0),
            last_texts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            answer: None,
            calls: AtomicUsize::new(0),
            last_texts: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn last_texts(&self) -> Vec<String> {
        self.last_texts.lock().clone()
    }
}

impl BatchProvider for FakeBatch {
    fn name(&self) -> &'static str {
        self.name
    }

    fn translate_batch<'a>(
        &'a self,
        texts: &'a [String],
        _languages: LanguagePair,
    ) -> BatchFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_texts.lock() = texts.to_vec();
            match &self.answer {
                Some(pairs) => BatchOutcome::Success(pairs.clone()),
                None => BatchOutcome::Failure(unavailable(self.name)),
            }
        })
    }
}

/// Single-text provider that knows a fixed dictionary and fails on anything else.
pub(crate) struct FakeText {
    answers: HashMap<String, String>,
    calls: AtomicUsize,
}

impl FakeText {
    pub(crate) fn answering(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: pairs
                .iter()
                .map(|(source, translation)| (source.to_string(), translation.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Self::answering(&[])
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextProvider for FakeText {
    fn name(&self) -> &'static str {
        "fake-web"
    }

    fn translate_text<'a>(&'a self, text: &'a str, _languages: LanguagePair) -> TextFuture<'a> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(text)
                .cloned()
                .ok_or_else(|| unavailable("fake-web"))
        })
    }
}

pub(crate) struct FakeExtractor {
    blocks: Option<Vec<TextBlock>>,
}

impl FakeExtractor {
    pub(crate) fn returning(blocks: Vec<TextBlock>) -> Arc<Self> {
        Arc::new(Self {
            blocks: Some(blocks),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self { blocks: None })
    }
}

impl TextExtractor for FakeExtractor {
    fn extract<'a>(&'a self, _image_path: &'a Path, _language: Language) -> ExtractFuture<'a> {
        Box::pin(async move {
            self.blocks.clone().ok_or_else(|| ExtractError::Failed {
                program: "fake".to_string(),
                stderr: "engine crashed".to_string(),
            })
        })
    }
}

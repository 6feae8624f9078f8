use anyhow::{Context, Result, anyhow};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub mod cache;
pub mod error;
pub mod languages;
pub mod logging;
pub mod ocr;
pub mod orchestrator;
pub mod pipeline;
pub mod providers;
pub mod render;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use cache::{CacheEntry, CacheStore, MemoryStore, SqliteStore, TranslationCache};
pub use error::{CacheError, ExtractError, PipelineError, ProviderError, RenderError};
pub use languages::{Dialect, Language, LanguagePair};
pub use ocr::{Point, TesseractExtractor, TextBlock, TextExtractor, TranslatedBlock};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    Pipeline, PipelineEvent, PipelineOutcome, PipelineRequest, PipelineRun, PipelineState,
    ProgressEvent, ProgressLog,
};
pub use providers::{BatchOutcome, BatchProvider, ProviderKind, TextProvider, TranslationPair};
pub use render::{Reconstructor, RenderOptions};

use settings::{CacheBackend, Settings};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub image: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub source_lang: Option<String>,
    pub target_lang: Option<String>,
    pub settings_path: Option<String>,
    pub json: bool,
    pub show_languages: bool,
    pub cache_history: Option<String>,
}

/// Runs one command and returns what should be printed on stdout. Progress goes to
/// stderr while the pipeline runs; Ctrl-C cancels it.
pub async fn run(config: Config) -> Result<String> {
    if config.show_languages {
        return Ok(format_languages());
    }

    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if let Some(text) = config.cache_history.as_deref() {
        let cache = open_cache(&settings)?;
        return format_history(&cache, text, config.json);
    }

    let image_path = config
        .image
        .clone()
        .ok_or_else(|| anyhow!("an image path is required"))?;
    let languages = resolve_languages(&config, &settings)?;
    let output_path = config
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&image_path));

    let pipeline = build_pipeline(&settings)?;
    let mut run = pipeline.run(PipelineRequest {
        image_path: image_path.clone(),
        languages,
    });

    let outcome = loop {
        tokio::select! {
            event = run.next_event() => match event {
                Some(PipelineEvent::Progress(progress)) => {
                    eprintln!("[{:.2}s] {}", progress.elapsed_seconds, progress.message);
                }
                Some(PipelineEvent::Finished(outcome)) => break outcome,
                None => return Err(anyhow!("pipeline stopped without a result")),
            },
            _ = tokio::signal::ctrl_c(), if !run.cancel_token().is_cancelled() => {
                run.cancel();
            }
        }
    };

    if !outcome.is_success() {
        return Err(anyhow!("{}", outcome.message));
    }
    if let Some(image) = &outcome.image {
        image
            .save_with_format(&output_path, image::ImageFormat::Png)
            .with_context(|| format!("failed to write image: {}", output_path.display()))?;
        info!(path = %output_path.display(), "translated image written");
    }

    if config.json {
        return serde_json::to_string_pretty(&outcome.blocks)
            .context("failed to serialize translated blocks");
    }
    Ok(format_blocks(&outcome.blocks, &output_path))
}

/// Wires the pipeline from settings: cache backend, provider chain, extractor and
/// renderer.
pub fn build_pipeline(settings: &Settings) -> Result<Pipeline> {
    let cache = open_cache(settings)?;
    let client =
        providers::build_client(&settings.http).context("failed to build HTTP client")?;
    let chain = providers::build_chain(settings, &client);
    let fallback = Arc::new(providers::build_web(settings, &client));
    let orchestrator = Orchestrator::new(chain, fallback, cache);

    let extractor = TesseractExtractor::new(settings.ocr.program.clone())
        .with_psm(settings.ocr.psm)
        .with_min_conf(settings.ocr.min_conf);
    let reconstructor = Reconstructor::from_settings(&settings.render);

    Ok(Pipeline::new(
        Arc::new(extractor),
        orchestrator,
        reconstructor,
        ProgressLog::new(settings.progress_history),
    ))
}

pub fn open_cache(settings: &Settings) -> Result<TranslationCache> {
    match settings.cache.backend {
        CacheBackend::Memory => Ok(TranslationCache::in_memory()),
        CacheBackend::Sqlite => {
            let path = settings.cache_path();
            let store = SqliteStore::open(&path)
                .with_context(|| format!("failed to open cache: {}", path.display()))?;
            Ok(TranslationCache::new(store))
        }
    }
}

fn resolve_languages(config: &Config, settings: &Settings) -> Result<LanguagePair> {
    let mut languages = settings.languages();
    if let Some(name) = config.source_lang.as_deref() {
        languages.source = Some(
            Language::from_name(name).ok_or_else(|| anyhow!("unknown source language '{}'", name))?,
        );
    }
    if let Some(name) = config.target_lang.as_deref() {
        languages.target = Some(
            Language::from_name(name).ok_or_else(|| anyhow!("unknown target language '{}'", name))?,
        );
    }
    Ok(languages)
}

fn default_output_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    image.with_file_name(format!("{}.translated.png", stem))
}

fn format_languages() -> String {
    Language::ALL
        .iter()
        .map(|language| {
            format!(
                "{}\t{}\t{}\t{}",
                language.name(),
                language.code(Dialect::Web),
                language.code(Dialect::Api),
                language.code(Dialect::Ocr)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_history(cache: &TranslationCache, text: &str, json: bool) -> Result<String> {
    let entries = cache.history(text);
    if json {
        return serde_json::to_string_pretty(&entries).context("failed to serialize history");
    }
    if entries.is_empty() {
        return Ok(format!("no cached translations for '{}'", text));
    }
    let lines = entries
        .iter()
        .map(|entry| format!("{}\t{}", format_timestamp(entry.created_at), entry.translated_text))
        .collect::<Vec<_>>();
    Ok(lines.join("\n"))
}

fn format_timestamp(millis: i64) -> String {
    let nanos = i128::from(millis) * 1_000_000;
    time::OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|at| at.format(&time::format_description::well_known::Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

fn format_blocks(blocks: &[TranslatedBlock], output: &Path) -> String {
    let mut lines = blocks
        .iter()
        .map(|block| format!("{}\t{}", block.source_text(), block.translated_text))
        .collect::<Vec<_>>();
    lines.push(format!("written: {}", output.display()));
    lines.join("\n")
}

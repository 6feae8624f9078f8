use thiserror::Error;

/// Why a provider did not produce a usable answer. Every variant is recovered by
/// falling back to the next provider, the cache, or the single-text provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} request timed out")]
    Timeout { provider: &'static str },

    #[error("{provider} request failed: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} response could not be parsed: {reason}")]
    Parse {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} prompt could not be rendered: {reason}")]
    Prompt {
        provider: &'static str,
        reason: String,
    },

    #[error("{provider} returned {got} translations for {expected} texts")]
    LengthMismatch {
        provider: &'static str,
        expected: usize,
        got: usize,
    },
}

impl ProviderError {
    pub(crate) fn from_reqwest(provider: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ProviderError::Timeout { provider }
        } else {
            ProviderError::Network { provider, source }
        }
    }

    pub(crate) fn parse(provider: &'static str, reason: impl Into<String>) -> Self {
        ProviderError::Parse {
            provider,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("cache directory could not be created: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited unsuccessfully: {stderr}")]
    Failed { program: String, stderr: String },

    #[error("image not found: {0}")]
    MissingImage(String),
}

/// Per-block rendering failures. Logged and skipped, never fatal.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("font has no glyph for {0:?}")]
    MissingGlyph(char),

    #[error("font data could not be parsed")]
    InvalidFont,

    #[error("bounding box is degenerate")]
    DegenerateBox,

    #[error("text pixmap of {width}x{height} could not be allocated")]
    Pixmap { width: u32, height: u32 },
}

/// Terminal failures of one pipeline invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("task cancelled")]
    Cancelled,

    #[error("translation service unavailable")]
    ServiceUnavailable,

    #[error("text extraction failed: {0}")]
    Extract(#[from] ExtractError),

    #[error("image could not be loaded: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

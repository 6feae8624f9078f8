mod parse;
mod tesseract;

use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::error::ExtractError;
use crate::languages::Language;

pub use tesseract::TesseractExtractor;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A detected region of source text. The polygon is the quadrilateral reported by
/// the extractor, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub polygon: Vec<Point>,
    pub source_text: String,
}

impl TextBlock {
    pub fn new(polygon: Vec<Point>, source_text: impl Into<String>) -> Self {
        Self {
            polygon,
            source_text: source_text.into(),
        }
    }

    /// Axis-aligned rectangle as a clockwise quadrilateral starting top-left.
    pub fn from_rect(x: f32, y: f32, w: f32, h: f32, source_text: impl Into<String>) -> Self {
        Self::new(
            vec![
                Point::new(x, y),
                Point::new(x + w, y),
                Point::new(x + w, y + h),
                Point::new(x, y + h),
            ],
            source_text,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranslatedBlock {
    #[serde(flatten)]
    pub block: TextBlock,
    pub translated_text: String,
}

impl TranslatedBlock {
    pub fn new(block: TextBlock, translated_text: impl Into<String>) -> Self {
        Self {
            block,
            translated_text: translated_text.into(),
        }
    }

    pub fn source_text(&self) -> &str {
        &self.block.source_text
    }

    pub fn polygon(&self) -> &[Point] {
        &self.block.polygon
    }
}

pub type ExtractFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<TextBlock>, ExtractError>> + Send + 'a>>;

/// Boundary to the OCR engine. An empty result means no text was found and is not
/// an error.
pub trait TextExtractor: Send + Sync {
    fn extract<'a>(&'a self, image_path: &'a Path, language: Language) -> ExtractFuture<'a>;
}

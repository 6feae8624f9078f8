use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::parse::parse_tsv_blocks;
use super::{ExtractFuture, TextBlock, TextExtractor};
use crate::error::ExtractError;
use crate::languages::{Dialect, Language};

/// Extractor backed by the `tesseract` command line tool (TSV output).
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    program: String,
    psm: u32,
    min_conf: f32,
}

impl TesseractExtractor {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            psm: 11,
            min_conf: 30.0,
        }
    }

    pub fn with_psm(mut self, psm: u32) -> Self {
        self.psm = psm;
        self
    }

    pub fn with_min_conf(mut self, min_conf: f32) -> Self {
        self.min_conf = min_conf;
        self
    }

    fn run_tsv(&self, path: &Path, language: &str) -> Result<String, ExtractError> {
        let output = Command::new(&self.program)
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(language)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()
            .map_err(|source| ExtractError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Failed {
                program: self.program.clone(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

impl Default for TesseractExtractor {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl TextExtractor for TesseractExtractor {
    fn extract<'a>(&'a self, image_path: &'a Path, language: Language) -> ExtractFuture<'a> {
        let path: PathBuf = image_path.to_path_buf();
        let this = self.clone();
        Box::pin(async move {
            if !path.exists() {
                return Err(ExtractError::MissingImage(path.display().to_string()));
            }
            let code = language.code(Dialect::Ocr);
            let blocks = tokio::task::spawn_blocking(move || -> Result<Vec<TextBlock>, ExtractError> {
                let tsv = this.run_tsv(&path, code)?;
                Ok(parse_tsv_blocks(&tsv, this.min_conf))
            })
            .await
            .map_err(|err| ExtractError::Failed {
                program: "tesseract worker".to_string(),
                stderr: err.to_string(),
            })??;
            debug!(blocks = blocks.len(), lang = code, "tesseract extraction finished");
            Ok(blocks)
        })
    }
}

use serde::Serialize;
use std::fmt;

/// Languages the pipeline can be asked to translate from or into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Language {
    Chinese,
    TraditionalChinese,
    English,
    French,
    German,
    Japanese,
    Korean,
    Italian,
    Spanish,
    Russian,
    Arabic,
}

/// Code families used by the different backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Web translate page (`sl`/`tl` parameters).
    Web,
    /// Commercial translator API (`from`/`to` parameters).
    Api,
    /// OCR model selection (tesseract traineddata names).
    Ocr,
}

impl Language {
    pub const ALL: [Language; 11] = [
        Language::Chinese,
        Language::TraditionalChinese,
        Language::English,
        Language::French,
        Language::German,
        Language::Japanese,
        Language::Korean,
        Language::Italian,
        Language::Spanish,
        Language::Russian,
        Language::Arabic,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Language::Chinese => "Chinese",
            Language::TraditionalChinese => "Traditional Chinese",
            Language::English => "English",
            Language::French => "French",
            Language::German => "German",
            Language::Japanese => "Japanese",
            Language::Korean => "Korean",
            Language::Italian => "Italian",
            Language::Spanish => "Spanish",
            Language::Russian => "Russian",
            Language::Arabic => "Arabic",
        }
    }

    /// Human-readable name used in LLM prompts.
    pub fn prompt_name(&self) -> &'static str {
        match self {
            Language::Chinese => "Simplified Chinese",
            other => other.name(),
        }
    }

    pub fn code(&self, dialect: Dialect) -> &'static str {
        use Language::*;
        match dialect {
            Dialect::Web => match self {
                Chinese => "zh-CN",
                TraditionalChinese => "zh-TW",
                English => "en",
                French => "fr",
                German => "de",
                Japanese => "ja",
                Korean => "ko",
                Italian => "it",
                Spanish => "es",
                Russian => "ru",
                Arabic => "ar",
            },
            Dialect::Api => match self {
                Chinese => "zh-Hans",
                TraditionalChinese => "zh-Hant",
                English => "en",
                French => "fr",
                German => "de",
                Japanese => "ja",
                Korean => "ko",
                Italian => "it",
                Spanish => "es",
                Russian => "ru",
                Arabic => "ar",
            },
            Dialect::Ocr => match self {
                Chinese => "chi_sim",
                TraditionalChinese => "chi_tra",
                English => "eng",
                French => "fra",
                German => "deu",
                Japanese => "jpn",
                Korean => "kor",
                Italian => "ita",
                Spanish => "spa",
                Russian => "rus",
                Arabic => "ara",
            },
        }
    }

    /// Parses a canonical name. Leading flag emoji and case are ignored, and
    /// `Simplified Chinese` is accepted as an alias of `Chinese`.
    pub fn from_name(raw: &str) -> Option<Language> {
        let trimmed = raw
            .trim_start_matches(|ch: char| !ch.is_ascii_alphabetic())
            .trim();
        if trimmed.eq_ignore_ascii_case("simplified chinese") {
            return Some(Language::Chinese);
        }
        Language::ALL
            .into_iter()
            .find(|lang| lang.name().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The active source/target selection. A side without a mapping entry falls back to
/// English (source) or Simplified Chinese (target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguagePair {
    pub source: Option<Language>,
    pub target: Option<Language>,
}

impl LanguagePair {
    pub fn new(source: Language, target: Language) -> Self {
        Self {
            source: Some(source),
            target: Some(target),
        }
    }

    pub fn from_names(source: &str, target: &str) -> Self {
        Self {
            source: Language::from_name(source),
            target: Language::from_name(target),
        }
    }

    pub fn source(&self) -> Language {
        self.source.unwrap_or(Language::English)
    }

    pub fn target(&self) -> Language {
        self.target.unwrap_or(Language::Chinese)
    }

    pub fn source_code(&self, dialect: Dialect) -> &'static str {
        self.source().code(dialect)
    }

    pub fn target_code(&self, dialect: Dialect) -> &'static str {
        self.target().code(dialect)
    }
}

impl Default for LanguagePair {
    fn default() -> Self {
        Self::new(Language::English, Language::Chinese)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traditional_chinese_codes_per_dialect() {
        let lang = Language::TraditionalChinese;
        assert_eq!(lang.code(Dialect::Web), "zh-TW");
        assert_eq!(lang.code(Dialect::Api), "zh-Hant");
        assert_eq!(lang.code(Dialect::Ocr), "chi_tra");
    }

    #[test]
    fn parses_names_with_flags_and_case() {
        assert_eq!(
            Language::from_name("🇨🇳Traditional Chinese"),
            Some(Language::TraditionalChinese)
        );
        assert_eq!(Language::from_name("english"), Some(Language::English));
        assert_eq!(Language::from_name("Simplified Chinese"), Some(Language::Chinese));
        assert_eq!(Language::from_name("Klingon"), None);
    }

    #[test]
    fn unmapped_selection_uses_defaults() {
        let pair = LanguagePair::from_names("Klingon", "Elvish");
        assert_eq!(pair.source_code(Dialect::Web), "en");
        assert_eq!(pair.target_code(Dialect::Web), "zh-CN");
        assert_eq!(pair.target_code(Dialect::Api), "zh-Hans");
    }
}

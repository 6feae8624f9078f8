use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::languages::LanguagePair;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");
const HOME_DIR_NAME: &str = ".image-translator";
const CACHE_FILE_NAME: &str = "cache.sqlite3";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source_language: String,
    pub target_language: String,
    pub http: HttpSettings,
    pub chain: Vec<String>,
    pub web: WebSettings,
    pub azure: AzureSettings,
    pub gemini: ModelSettings,
    pub openai: ModelSettings,
    pub cache: CacheSettings,
    pub render: RenderSettings,
    pub progress_history: usize,
    pub ocr: OcrSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
    pub max_retries: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WebSettings {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AzureSettings {
    pub url: String,
    pub key: Option<String>,
    pub region: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub url: String,
    pub key: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub margin: u32,
    pub discoloration: u8,
    pub max_font_size: u32,
    pub font_path: Option<String>,
    pub font_family: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub program: String,
    pub psm: u32,
    pub min_conf: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source_language: "English".to_string(),
            target_language: "Chinese".to_string(),
            http: HttpSettings {
                connect_timeout_secs: 30,
                timeout_secs: 30,
                max_retries: 2,
            },
            chain: vec![
                "gemini".to_string(),
                "azure".to_string(),
                "openai".to_string(),
            ],
            web: WebSettings {
                url: "https://translate.google.com/m".to_string(),
            },
            azure: AzureSettings {
                url: "https://api.cognitive.microsofttranslator.com/translate".to_string(),
                key: None,
                region: "eastus".to_string(),
            },
            gemini: ModelSettings {
                url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
                key: None,
                model: "gemini-1.5-flash".to_string(),
            },
            openai: ModelSettings {
                url: "https://api.openai.com/v1".to_string(),
                key: None,
                model: "gpt-4o-mini".to_string(),
            },
            cache: CacheSettings {
                backend: CacheBackend::Sqlite,
                path: None,
            },
            render: RenderSettings {
                margin: 10,
                discoloration: 40,
                max_font_size: 500,
                font_path: None,
                font_family: None,
            },
            progress_history: 30,
            ocr: OcrSettings {
                program: "tesseract".to_string(),
                psm: 11,
                min_conf: 30.0,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    languages: Option<LanguagesFile>,
    http: Option<HttpFile>,
    providers: Option<ProvidersFile>,
    cache: Option<CacheFile>,
    render: Option<RenderFile>,
    pipeline: Option<PipelineFile>,
    ocr: Option<OcrFile>,
}

#[derive(Debug, Default, Deserialize)]
struct LanguagesFile {
    source: Option<String>,
    target: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpFile {
    connect_timeout_secs: Option<u64>,
    timeout_secs: Option<u64>,
    max_retries: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersFile {
    chain: Option<Vec<String>>,
    web: Option<EndpointFile>,
    azure: Option<EndpointFile>,
    gemini: Option<EndpointFile>,
    openai: Option<EndpointFile>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointFile {
    url: Option<String>,
    key: Option<String>,
    model: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheFile {
    backend: Option<CacheBackend>,
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderFile {
    margin: Option<u32>,
    discoloration: Option<u8>,
    max_font_size: Option<u32>,
    font_path: Option<String>,
    font_family: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PipelineFile {
    progress_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrFile {
    program: Option<String>,
    psm: Option<u32>,
    min_conf: Option<f32>,
}

/// Loads settings from the embedded defaults, the working directory, the home
/// settings directory, an optional explicit file and finally the environment.
pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let home = home_dir();
    if let Some(home) = home.as_deref() {
        ensure_home_settings_file(home)?;
    }

    let mut ordered_paths = vec![
        PathBuf::from("settings.toml"),
        PathBuf::from("settings.local.toml"),
    ];
    if let Some(home) = home {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    load_layers(&ordered_paths, extra_path, |name| std::env::var(name).ok())
}

/// Merges `paths` (missing files are skipped) and `extra_path` (must exist) over the
/// embedded defaults, then applies environment overrides read through `env`.
pub fn load_layers<F>(paths: &[PathBuf], extra_path: Option<&Path>, env: F) -> Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();
    let embedded: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).context("failed to parse embedded settings")?;
    settings.merge(embedded);

    let mut ordered_paths = paths.to_vec();
    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    settings.apply_env(env);
    Ok(settings)
}

impl Settings {
    pub fn languages(&self) -> LanguagePair {
        LanguagePair::from_names(&self.source_language, &self.target_language)
    }

    /// The SQLite file to open: the configured path, else one under the home
    /// settings directory, else one in the working directory.
    pub fn cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return path.clone();
        }
        match home_dir() {
            Some(home) => home.join(CACHE_FILE_NAME),
            None => PathBuf::from(CACHE_FILE_NAME),
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(languages) = incoming.languages {
            set_text(&mut self.source_language, languages.source);
            set_text(&mut self.target_language, languages.target);
        }
        if let Some(http) = incoming.http {
            if let Some(secs) = http.connect_timeout_secs.filter(|secs| *secs > 0) {
                self.http.connect_timeout_secs = secs;
            }
            if let Some(secs) = http.timeout_secs.filter(|secs| *secs > 0) {
                self.http.timeout_secs = secs;
            }
            if let Some(retries) = http.max_retries {
                self.http.max_retries = retries;
            }
        }
        if let Some(providers) = incoming.providers {
            if let Some(chain) = providers.chain {
                self.chain = chain;
            }
            if let Some(web) = providers.web {
                set_text(&mut self.web.url, web.url);
            }
            if let Some(azure) = providers.azure {
                set_text(&mut self.azure.url, azure.url);
                set_text(&mut self.azure.region, azure.region);
                set_key(&mut self.azure.key, azure.key);
            }
            if let Some(gemini) = providers.gemini {
                self.gemini.merge(gemini);
            }
            if let Some(openai) = providers.openai {
                self.openai.merge(openai);
            }
        }
        if let Some(cache) = incoming.cache {
            if let Some(backend) = cache.backend {
                self.cache.backend = backend;
            }
            if let Some(path) = cache.path
                && !path.trim().is_empty()
            {
                self.cache.path = Some(PathBuf::from(path.trim()));
            }
        }
        if let Some(render) = incoming.render {
            if let Some(margin) = render.margin {
                self.render.margin = margin;
            }
            if let Some(strength) = render.discoloration {
                self.render.discoloration = strength;
            }
            if let Some(size) = render.max_font_size.filter(|size| *size > 0) {
                self.render.max_font_size = size;
            }
            set_key(&mut self.render.font_path, render.font_path);
            set_key(&mut self.render.font_family, render.font_family);
        }
        if let Some(pipeline) = incoming.pipeline
            && let Some(limit) = pipeline.progress_history
            && limit > 0
        {
            self.progress_history = limit;
        }
        if let Some(ocr) = incoming.ocr {
            set_text(&mut self.ocr.program, ocr.program);
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
            if let Some(min_conf) = ocr.min_conf {
                self.ocr.min_conf = min_conf;
            }
        }
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(name).filter(|value| !value.trim().is_empty());
        set_text(&mut self.web.url, var("GOOGLE_URL"));
        set_text(&mut self.azure.url, var("AZURE_URL"));
        set_text(&mut self.azure.region, var("AZURE_REGION"));
        set_key(&mut self.azure.key, var("AZURE_KEY"));
        set_text(&mut self.gemini.url, var("GEMINI_URL"));
        set_key(
            &mut self.gemini.key,
            var("GEMINI_API_KEY").or_else(|| var("GOOGLE_API_KEY")),
        );
        set_text(&mut self.openai.url, var("OPENAI_URL"));
        set_key(&mut self.openai.key, var("OPENAI_API_KEY"));
    }
}

impl ModelSettings {
    fn merge(&mut self, incoming: EndpointFile) {
        set_text(&mut self.url, incoming.url);
        set_text(&mut self.model, incoming.model);
        set_key(&mut self.key, incoming.key);
    }
}

fn set_text(slot: &mut String, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *slot = value.trim().to_string();
    }
}

fn set_key(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *slot = Some(value.trim().to_string());
    }
}

fn ensure_home_settings_file(home: &Path) -> Result<()> {
    fs::create_dir_all(home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(HOME_DIR_NAME))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn embedded_defaults_match_builtin_defaults() {
        let settings = load_layers(&[], None, no_env).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("settings.toml");
        let local = dir.path().join("settings.local.toml");
        fs::write(
            &base,
            "[providers]\nchain = [\"azure\", \"web\"]\n[render]\nmargin = 4\n",
        )
        .unwrap();
        fs::write(&local, "[render]\nmargin = 6\n[pipeline]\nprogress_history = 5\n").unwrap();

        let settings = load_layers(&[base, local], None, no_env).unwrap();
        assert_eq!(settings.chain, vec!["azure", "web"]);
        assert_eq!(settings.render.margin, 6);
        assert_eq!(settings.render.discoloration, 40);
        assert_eq!(settings.progress_history, 5);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_layers(&[], Some(&missing), no_env).is_err());
    }

    #[test]
    fn environment_overrides_files() {
        let env = HashMap::from([
            ("AZURE_KEY", "azure-secret"),
            ("GOOGLE_API_KEY", "google-secret"),
            ("OPENAI_URL", "http://localhost:8080/v1"),
            ("OPENAI_API_KEY", "  "),
        ]);
        let settings = load_layers(&[], None, |name| {
            env.get(name).map(|value| value.to_string())
        })
        .unwrap();
        assert_eq!(settings.azure.key.as_deref(), Some("azure-secret"));
        assert_eq!(settings.gemini.key.as_deref(), Some("google-secret"));
        assert_eq!(settings.openai.url, "http://localhost:8080/v1");
        assert_eq!(settings.openai.key, None);
    }

    #[test]
    fn blank_keys_stay_unset() {
        let settings = load_layers(&[], None, no_env).unwrap();
        assert_eq!(settings.azure.key, None);
        assert_eq!(settings.render.font_path, None);
        assert_eq!(settings.cache.path, None);
    }
}

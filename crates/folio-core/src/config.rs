//! Configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (`__` separates nested keys, e.g. `APP_EMBEDDING__BATCH_SIZE=32`) into a
//! typed [`Settings`]. Relative paths resolve against the config directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::loader::LoaderConfig;
use crate::retry::RetrySettings;
use crate::splitter::SplitterConfig;
use crate::types::Distance;

/// Placeholder shipped in sample `.env` files; never a real key.
const PLACEHOLDER_API_KEY: &str = "your_openai_api_key_here";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub splitter: SplitterConfig,
    pub loader: LoaderConfig,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
    pub retrieval: RetrievalSettings,
    pub retry: RetrySettings,
    pub build: BuildSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data: DataSettings::default(),
            splitter: SplitterConfig::default(),
            loader: LoaderConfig::default(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
            retrieval: RetrievalSettings::default(),
            retry: RetrySettings::default(),
            build: BuildSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DataSettings {
    pub source_dir: PathBuf,
    pub index_dir: PathBuf,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { source_dir: PathBuf::from("data"), index_dir: PathBuf::from("index") }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    Hash,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    pub dim: usize,
    pub base_url: String,
    pub api_key_env: String,
    pub batch_size: usize,
    /// Batches in flight at once.
    pub concurrency: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-3-small".to_string(),
            dim: 1536,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            batch_size: 64,
            concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Scripted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::OpenAi,
            model: "gpt-4.1-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1500,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub distance: Distance,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 10, distance: Distance::Cosine }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BuildSettings {
    /// Files loaded and split concurrently.
    pub parallel_files: usize,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self { parallel_files: 8 }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()?;
        let positive = [
            ("embedding.dim", self.embedding.dim),
            ("embedding.batch_size", self.embedding.batch_size),
            ("embedding.concurrency", self.embedding.concurrency),
            ("retrieval.top_k", self.retrieval.top_k),
            ("build.parallel_files", self.build.parallel_files),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{key} must be positive")));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfig("retry.max_attempts must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(Error::InvalidConfig("generation.temperature must be within 0..=2".into()));
        }
        Ok(())
    }

    /// Expand and anchor the data paths to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        self.data.source_dir = resolve_with_base(base, self.data.source_dir.to_string_lossy());
        self.data.index_dir = resolve_with_base(base, self.data.index_dir.to_string_lossy());
    }
}

pub struct Config {
    figment: Figment,
    base_dir: PathBuf,
}

impl Config {
    /// Load from the current directory.
    pub fn load() -> Result<Self> {
        let cwd = env::current_dir()?;
        Self::load_from(&cwd)
    }

    /// Load `config.toml` (and its environment overlay) from `dir`.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            other => tracing::debug!(env = other, "no config overlay for environment"),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment, base_dir: dir.to_path_buf() })
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::InvalidConfig(format!("failed to get '{key}': {e}")))
    }

    /// Typed, path-resolved and validated settings.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings =
            self.figment.extract().map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.resolve_paths(&self.base_dir);
        settings.validate()?;
        Ok(settings)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// Read an API key from the environment variable `var`.
pub fn read_api_key(var: &str) -> Result<String> {
    let key = env::var(var).unwrap_or_default();
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidConfig(format!("environment variable {var} is not set")));
    }
    if key == PLACEHOLDER_API_KEY {
        return Err(Error::InvalidConfig(format!("{var} still holds the placeholder value")));
    }
    Ok(key.to_string())
}

/// Whether `APP_USE_FAKE_EMBEDDINGS` asks for the offline hashing embedder.
pub fn fake_embeddings_requested() -> bool {
    env::var("APP_USE_FAKE_EMBEDDINGS").is_ok_and(|v| matches!(v.trim(), "1" | "true" | "yes"))
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}

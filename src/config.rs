use std::path::{Path, PathBuf};

use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::storage::{BackendLocal, StorageManager};

const CONFIG_FILE: &str = "config.yaml";

/// Similarity threshold used by the letter search page
const DEFAULT_SEARCH_THRESHOLD: f32 = 0.2;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const DEFAULT_LETTERS_PER_PAGE: usize = 5;

const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_LOCAL_MODEL: &str = "bge-small-en-v1.5";
const DEFAULT_OCR_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
/// Pause between embedding requests to stay under API rate limits
const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not access config: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("config file is not valid utf8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Resolve the data directory: `TRIBUTE_BASE_PATH` or `~/.local/share/tribute`.
pub fn base_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("TRIBUTE_BASE_PATH") {
        return Ok(PathBuf::from(path));
    }

    let home = my_home()
        .map_err(|err| ConfigError::Invalid(format!("couldn't find home dir: {err}")))?
        .ok_or_else(|| ConfigError::Invalid("couldn't find home dir".to_string()))?;

    Ok(home.join(".local/share/tribute"))
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Results must score strictly above this
    #[serde(default = "default_search_threshold")]
    pub threshold: f32,

    /// Maximum number of letters returned per question
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SEARCH_THRESHOLD,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    OpenAi,
    /// fastembed model running in-process
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Remote model name. Must match the model the stored embeddings were built with.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// fastembed model name, used when `provider: local`
    #[serde(default = "default_local_model")]
    pub local_model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            local_model: default_local_model(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OcrConfig {
    #[serde(default = "default_ocr_model")]
    pub model: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Scanned letters to transcribe
    #[serde(default = "default_ocr_input_dir")]
    pub input_dir: String,

    #[serde(default = "default_ocr_output_file")]
    pub output_file: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: default_ocr_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            input_dir: default_ocr_input_dir(),
            output_file: default_ocr_output_file(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_letters_per_page")]
    pub letters_per_page: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            letters_per_page: DEFAULT_LETTERS_PER_PAGE,
        }
    }
}

fn default_search_threshold() -> f32 {
    DEFAULT_SEARCH_THRESHOLD
}

fn default_search_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_ocr_model() -> String {
    DEFAULT_OCR_MODEL.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_api_key_env() -> String {
    DEFAULT_API_KEY_ENV.to_string()
}

fn default_request_delay_ms() -> u64 {
    DEFAULT_REQUEST_DELAY_MS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_ocr_input_dir() -> String {
    "archive/originals".to_string()
}

fn default_ocr_output_file() -> String {
    "archive/letters.json".to_string()
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_letters_per_page() -> usize {
    DEFAULT_LETTERS_PER_PAGE
}

fn default_letters_file() -> String {
    "letters.json".to_string()
}

fn default_embeddings_file() -> String {
    "letter_embeddings.json".to_string()
}

fn default_letter_images_dir() -> String {
    "all_letters".to_string()
}

fn default_photos_dir() -> String {
    "photos".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_letters_file")]
    pub letters_file: String,
    #[serde(default = "default_embeddings_file")]
    pub embeddings_file: String,
    #[serde(default = "default_letter_images_dir")]
    pub letter_images_dir: String,
    #[serde(default = "default_photos_dir")]
    pub photos_dir: String,

    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub web: WebConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            letters_file: default_letters_file(),
            embeddings_file: default_embeddings_file(),
            letter_images_dir: default_letter_images_dir(),
            photos_dir: default_photos_dir(),
            search: SearchConfig::default(),
            embedding: EmbeddingConfig::default(),
            ocr: OcrConfig::default(),
            web: WebConfig::default(),
            base_path: PathBuf::new(),
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        if !(-1.0..=1.0).contains(&search.threshold) {
            return Err(ConfigError::Invalid(format!(
                "search.threshold must be between -1.0 and 1.0, got {}",
                search.threshold
            )));
        }

        if search.limit == 0 {
            return Err(ConfigError::Invalid(
                "search.limit must be greater than 0".to_string(),
            ));
        }

        if self.web.letters_per_page == 0 {
            return Err(ConfigError::Invalid(
                "web.letters_per_page must be greater than 0".to_string(),
            ));
        }

        if self.embedding.request_timeout_secs == 0 || self.ocr.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&base_path()?)
    }

    pub fn load_with(base_path: &Path) -> Result<Self, ConfigError> {
        let store = BackendLocal::new(base_path)?;

        // create new if does not exist
        if !store.exists(CONFIG_FILE) {
            log::info!("writing default config to {}", base_path.join(CONFIG_FILE).display());
            store.write(CONFIG_FILE, serde_yml::to_string(&Self::default())?.as_bytes())?;
        }

        let config_str = String::from_utf8(store.read(CONFIG_FILE)?)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case new keys were added
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let store = BackendLocal::new(&self.base_path)?;

        let config_str = serde_yml::to_string(&self)?;
        store.write(CONFIG_FILE, config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path against the base directory.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn letters_path(&self) -> PathBuf {
        self.resolve(&self.letters_file)
    }

    pub fn embeddings_path(&self) -> PathBuf {
        self.resolve(&self.embeddings_file)
    }

    pub fn letter_images_path(&self) -> PathBuf {
        self.resolve(&self.letter_images_dir)
    }

    pub fn photos_path(&self) -> PathBuf {
        self.resolve(&self.photos_dir)
    }
}

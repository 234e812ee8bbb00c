//! Configuration loading for docscope.
//!
//! Layered config: defaults -> user config file -> explicit config file -> env vars.
//! The user config file lives at `~/.config/docscope/config.toml`; environment
//! variables use the `DOCSCOPE_` prefix and `__` between nested keys
//! (e.g. `DOCSCOPE_PROBES__LAMBDA=0.001`).

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::DocscopeError;

/// Topic building knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicSettings {
    /// Diverse samples selected per topic (0 disables sampling)
    #[serde(default = "default_topic_samples")]
    pub num_samples: usize,

    /// Keywords ranked per topic (0 disables keywords)
    #[serde(default = "default_num_keywords")]
    pub num_keywords: usize,

    /// Sort tree children by member count, largest first
    #[serde(default = "default_true")]
    pub sort_children: bool,

    /// Template used to generate topic labels
    #[serde(default = "default_label_template")]
    pub label_template: String,

    /// Template used to generate topic summaries
    #[serde(default = "default_summary_template")]
    pub summary_template: String,
}

fn default_topic_samples() -> usize {
    8
}
fn default_num_keywords() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_label_template() -> String {
    "topic_label".to_string()
}
fn default_summary_template() -> String {
    "topic_summary".to_string()
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            num_samples: default_topic_samples(),
            num_keywords: default_num_keywords(),
            sort_children: default_true(),
            label_template: default_label_template(),
            summary_template: default_summary_template(),
        }
    }
}

/// Keyword extraction knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordSettings {
    /// Drop terms that occur in fewer documents than this
    #[serde(default = "default_min_df")]
    pub min_document_frequency: usize,

    /// Drop terms that occur in more than this share of documents
    #[serde(default = "default_max_ratio")]
    pub max_document_ratio: f32,

    /// Apply the English Snowball stemmer
    #[serde(default = "default_true")]
    pub stem: bool,
}

fn default_min_df() -> usize {
    1
}
fn default_max_ratio() -> f32 {
    1.0
}

impl Default for KeywordSettings {
    fn default() -> Self {
        Self {
            min_document_frequency: default_min_df(),
            max_document_ratio: default_max_ratio(),
            stem: default_true(),
        }
    }
}

impl KeywordSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.max_document_ratio > 0.0 && self.max_document_ratio <= 1.0) {
            return Err(format!(
                "max_document_ratio must be in (0.0, 1.0], got {}",
                self.max_document_ratio
            ));
        }
        Ok(())
    }
}

/// Probe training knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeSettings {
    /// Seed documents rewritten per concept, or synthetic examples per label
    #[serde(default = "default_probe_samples")]
    pub num_samples: usize,

    /// Raw documents drawn as negatives per positive example
    #[serde(default = "default_negative_multiplier")]
    pub negative_multiplier: usize,

    /// L2 penalty strength
    #[serde(default = "default_lambda")]
    pub lambda: f64,

    /// Folds used for cross-validated accuracy
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,

    /// Accuracy at or below this triggers a low-separability warning
    #[serde(default = "default_accuracy_threshold")]
    pub accuracy_threshold: f64,

    /// Optimizer iteration cap
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Template used to rewrite seed documents through a concept
    #[serde(default = "default_rewrite_template")]
    pub rewrite_template: String,

    /// Template used to synthesize classifier examples
    #[serde(default = "default_example_template")]
    pub example_template: String,
}

fn default_probe_samples() -> usize {
    100
}
fn default_negative_multiplier() -> usize {
    1
}
fn default_lambda() -> f64 {
    1e-5
}
fn default_cv_folds() -> usize {
    4
}
fn default_accuracy_threshold() -> f64 {
    0.9
}
fn default_max_iterations() -> usize {
    500
}
fn default_rewrite_template() -> String {
    "concept_rewrite".to_string()
}
fn default_example_template() -> String {
    "classifier_example".to_string()
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            num_samples: default_probe_samples(),
            negative_multiplier: default_negative_multiplier(),
            lambda: default_lambda(),
            cv_folds: default_cv_folds(),
            accuracy_threshold: default_accuracy_threshold(),
            max_iterations: default_max_iterations(),
            rewrite_template: default_rewrite_template(),
            example_template: default_example_template(),
        }
    }
}

impl ProbeSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.num_samples == 0 {
            return Err("num_samples must be > 0".to_string());
        }
        if self.negative_multiplier == 0 {
            return Err("negative_multiplier must be > 0".to_string());
        }
        if !(self.lambda >= 0.0 && self.lambda.is_finite()) {
            return Err(format!("lambda must be >= 0, got {}", self.lambda));
        }
        if self.cv_folds == 0 {
            return Err("cv_folds must be > 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.accuracy_threshold) {
            return Err(format!(
                "accuracy_threshold must be 0.0-1.0, got {}",
                self.accuracy_threshold
            ));
        }
        if self.max_iterations == 0 {
            return Err("max_iterations must be > 0".to_string());
        }
        Ok(())
    }
}

/// Embedding/generation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// API base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Chat model used for labels, rewrites and synthetic examples
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Embedding model
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// API key (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts per request
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Character budget of one embedding request
    #[serde(default = "default_max_batch_chars")]
    pub max_batch_chars: usize,

    /// Upper bound on in-flight generation/embedding requests per operation
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Price in USD per million prompt tokens
    #[serde(default)]
    pub input_price_per_million: f64,

    /// Price in USD per million completion tokens
    #[serde(default)]
    pub output_price_per_million: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_max_batch_chars() -> usize {
    80_000
}
fn default_max_concurrency() -> usize {
    8
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            max_batch_chars: default_max_batch_chars(),
            max_concurrency: default_max_concurrency(),
            input_price_per_million: 0.0,
            output_price_per_million: 0.0,
        }
    }
}

impl ServiceSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_batch_chars == 0 {
            return Err("max_batch_chars must be > 0".to_string());
        }
        if self.max_concurrency == 0 {
            return Err("max_concurrency must be > 0".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Topic building
    #[serde(default)]
    pub topics: TopicSettings,

    /// Keyword extraction
    #[serde(default)]
    pub keywords: KeywordSettings,

    /// Probe training
    #[serde(default)]
    pub probes: ProbeSettings,

    /// External services
    #[serde(default)]
    pub service: ServiceSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/docscope/config.toml)
    /// 3. Explicit config file (optional)
    /// 4. Environment variables (DOCSCOPE_*)
    pub fn load(config_path: Option<&str>) -> Result<Self, DocscopeError> {
        let config_dir = ProjectDirs::from("", "", "docscope")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| DocscopeError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("DOCSCOPE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder
            .build()
            .map_err(|e| DocscopeError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DocscopeError::Config(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<(), DocscopeError> {
        self.keywords.validate().map_err(DocscopeError::Config)?;
        self.probes.validate().map_err(DocscopeError::Config)?;
        self.service.validate().map_err(DocscopeError::Config)?;
        Ok(())
    }
}

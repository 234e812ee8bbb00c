//! # docscope-types
//!
//! Shared domain types for docscope.
//!
//! This crate defines the vocabulary every other crate speaks:
//! - Identifiers: 1-based document ids, index identity tokens, topic level keys
//! - Errors: the fatal error taxonomy shared across the workspace
//! - Settings: layered configuration for topics, keywords, probes and services
//!
//! ## Usage
//!
//! ```rust
//! use docscope_types::{LevelKey, Settings};
//!
//! let settings = Settings::default();
//! let key = LevelKey::from(8usize);
//! assert_eq!(key.to_string(), "8");
//! assert_eq!(settings.topics.num_keywords, 10);
//! ```

pub mod config;
pub mod error;
pub mod ids;

pub use config::{KeywordSettings, ProbeSettings, ServiceSettings, Settings, TopicSettings};
pub use error::{DocscopeError, Result};
pub use ids::{DocId, IndexId, LevelKey};

//! External collaborator seams for docscope.
//!
//! Provides:
//! - `TextGenerator` / `TextEmbedder` async traits for the generation and
//!   embedding services
//! - Prompt templates with an injectable `TemplateStore`
//! - A shared atomic `CostTracker`
//! - Batched, order-preserving embedding with bounded concurrency
//! - An OpenAI-compatible HTTP client and deterministic mocks

mod api;
mod batch;
mod concurrency;
mod cost;
mod error;
mod mock;
mod service;
mod template;

pub use api::{ApiClient, ApiClientConfig};
pub use batch::{embed_in_batches, plan_batches};
pub use concurrency::try_join_bounded;
pub use cost::CostTracker;
pub use error::LlmError;
pub use mock::{MockEmbedder, MockGenerator};
pub use service::{EmbeddingBatch, Generation, ServiceContext, TextEmbedder, TextGenerator};
pub use template::{InMemoryTemplates, Prompt, Template, TemplateStore, NOT_PROVIDED};

//! Service traits and the bundle of collaborators handed to builders/trainers.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use docscope_types::{DocscopeError, ServiceSettings};
use ndarray::Array2;
use tracing::debug;

use crate::batch::embed_in_batches;
use crate::cost::CostTracker;
use crate::error::LlmError;
use crate::template::{Prompt, Template, TemplateStore};

/// Text returned by a generation service together with its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Raw response text
    pub text: String,
    /// Cost in USD
    pub cost: f64,
}

impl Generation {
    /// Response with zero cost.
    pub fn free(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            cost: 0.0,
        }
    }
}

/// Vectors returned by an embedding service together with their cost.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingBatch {
    /// One vector per input text, in input order
    pub vectors: Vec<Vec<f32>>,
    /// Cost in USD
    pub cost: f64,
}

/// Text-generation collaborator.
///
/// Implementations own retry policy; a returned error is treated as fatal
/// for the whole batch operation that issued the call.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for a rendered prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError>;
}

/// Text-embedding collaborator.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Embed a batch of texts. Must return exactly one vector per text.
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, LlmError>;
}

/// Everything a topic builder or probe trainer needs from the outside world.
#[derive(Clone)]
pub struct ServiceContext {
    /// Generation service
    pub generator: Arc<dyn TextGenerator>,
    /// Embedding service
    pub embedder: Arc<dyn TextEmbedder>,
    /// Template lookup
    pub templates: Arc<dyn TemplateStore>,
    /// Character budget of one embedding request
    pub max_batch_chars: usize,
    /// Upper bound on in-flight service calls per operation
    pub max_concurrency: usize,
}

impl ServiceContext {
    /// Bundle collaborators with the default [`ServiceSettings`] limits.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn TextEmbedder>,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        Self::from_settings(generator, embedder, templates, &ServiceSettings::default())
    }

    /// Bundle collaborators with the batch budget and concurrency limit of
    /// `settings`.
    pub fn from_settings(
        generator: Arc<dyn TextGenerator>,
        embedder: Arc<dyn TextEmbedder>,
        templates: Arc<dyn TemplateStore>,
        settings: &ServiceSettings,
    ) -> Self {
        Self {
            generator,
            embedder,
            templates,
            max_batch_chars: settings.max_batch_chars,
            max_concurrency: settings.max_concurrency.max(1),
        }
    }

    /// Override the embedding batch budget.
    pub fn with_max_batch_chars(mut self, max_batch_chars: usize) -> Self {
        self.max_batch_chars = max_batch_chars;
        self
    }

    /// Override the in-flight call limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Resolve a template or fail with `MissingTemplate`.
    pub fn template(&self, name: &str) -> Result<Template, DocscopeError> {
        self.templates
            .get(name)
            .ok_or_else(|| DocscopeError::MissingTemplate(name.to_string()))
    }

    /// Render `template`, call the generator, record the cost and return the
    /// cleaned response.
    pub async fn generate(
        &self,
        template: &Template,
        vars: &[(&str, &str)],
        cost: &CostTracker,
    ) -> Result<String, DocscopeError> {
        let prompt = template.render(vars)?;
        let generation = self.generator.generate(&prompt).await?;
        cost.add(generation.cost);
        debug!(
            chars = generation.text.len(),
            cost = generation.cost,
            "Generation complete"
        );
        Ok(template.clean_response(&generation.text))
    }

    /// Embed texts in concurrent batches; one unit-normalised column per text.
    pub async fn embed(
        &self,
        texts: &[String],
        cost: &CostTracker,
    ) -> Result<Array2<f32>, DocscopeError> {
        let matrix = embed_in_batches(
            self.embedder.as_ref(),
            texts,
            self.max_batch_chars,
            self.max_concurrency,
            cost,
        )
        .await?;
        Ok(matrix)
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("max_batch_chars", &self.max_batch_chars)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

//! Deterministic service mocks for tests and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;
use crate::service::{EmbeddingBatch, Generation, TextEmbedder, TextGenerator};
use crate::template::Prompt;

type Responder = dyn Fn(&Prompt) -> Result<String, LlmError> + Send + Sync;

/// Mock generator with a scripted response function.
pub struct MockGenerator {
    responder: Arc<Responder>,
    cost: f64,
    calls: AtomicUsize,
}

impl MockGenerator {
    /// Respond with a caller-supplied function of the prompt.
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Prompt) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            cost: 0.0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Echo the user message back.
    pub fn echo() -> Self {
        Self::with_responder(|prompt| Ok(prompt.user.clone()))
    }

    /// Always return the same text.
    pub fn fixed(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_responder(move |_| Ok(text.clone()))
    }

    /// Always fail with an API error.
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_responder(move |_| Err(LlmError::ApiError(message.clone())))
    }

    /// Charge a fixed cost per call.
    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    /// Number of completed or attempted calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &Prompt) -> Result<Generation, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = (self.responder)(prompt)?;
        Ok(Generation {
            text,
            cost: self.cost,
        })
    }
}

/// Mock embedder producing hashed bag-of-words vectors.
///
/// Texts that share words get similar vectors; identical texts get identical
/// vectors. Explicit vectors can be pinned per text.
pub struct MockEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    cost_per_text: f64,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    /// Create an embedder of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            table: HashMap::new(),
            cost_per_text: 0.0,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// An embedder whose every call fails.
    pub fn failing(dimension: usize) -> Self {
        let mut embedder = Self::new(dimension);
        embedder.fail = true;
        embedder
    }

    /// Pin the vector returned for an exact text.
    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), vector);
        self
    }

    /// Charge a cost per embedded text.
    pub fn with_cost_per_text(mut self, cost: f64) -> Self {
        self.cost_per_text = cost;
        self
    }

    /// Number of batch calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hashed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        let tokens = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty());
        let mut any = false;
        for token in tokens {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let slot = (h % self.dimension as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
            any = true;
        }
        if !any || vector.iter().all(|v| *v == 0.0) {
            vector[0] = 1.0;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        vector.iter_mut().for_each(|v| *v /= norm);
        vector
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<EmbeddingBatch, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::ApiError("embedding service unavailable".to_string()));
        }
        let vectors = texts
            .iter()
            .map(|text| {
                self.table
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.hashed(text))
            })
            .collect();
        Ok(EmbeddingBatch {
            vectors,
            cost: self.cost_per_text * texts.len() as f64,
        })
    }
}

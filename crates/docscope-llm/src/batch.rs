//! Batched concurrent embedding.

use std::ops::Range;

use ndarray::Array2;
use tracing::{debug, instrument};

use crate::concurrency::try_join_bounded;
use crate::cost::CostTracker;
use crate::error::LlmError;
use crate::service::TextEmbedder;

/// Split texts into contiguous ranges whose summed character count stays
/// within `max_chars`. A single text longer than the budget gets its own batch.
pub fn plan_batches(texts: &[String], max_chars: usize) -> Vec<Range<usize>> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut chars = 0;
    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        if i > start && chars + len > max_chars {
            batches.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < texts.len() {
        batches.push(start..texts.len());
    }
    batches
}

/// Embed `texts` as concurrent batches, at most `max_concurrency` in
/// flight, and reassemble them in input order.
///
/// Returns a `D x texts.len()` matrix with unit-normalised columns. Any
/// failing batch fails the whole call.
#[instrument(skip(embedder, texts, cost), fields(texts = texts.len()))]
pub async fn embed_in_batches(
    embedder: &dyn TextEmbedder,
    texts: &[String],
    max_chars: usize,
    max_concurrency: usize,
    cost: &CostTracker,
) -> Result<Array2<f32>, LlmError> {
    if texts.is_empty() {
        return Ok(Array2::zeros((0, 0)));
    }

    let batches = plan_batches(texts, max_chars.max(1));
    debug!(batches = batches.len(), "Dispatching embedding batches");

    let results = try_join_bounded(
        batches
            .iter()
            .map(|range| embedder.embed(&texts[range.clone()])),
        max_concurrency,
    )
    .await?;

    let mut dimension: Option<usize> = None;
    let mut matrix: Option<Array2<f32>> = None;
    for (range, batch) in batches.iter().zip(results) {
        if batch.vectors.len() != range.len() {
            return Err(LlmError::ParseError(format!(
                "expected {} embeddings, got {}",
                range.len(),
                batch.vectors.len()
            )));
        }
        cost.add(batch.cost);

        for (offset, vector) in batch.vectors.into_iter().enumerate() {
            let expected = *dimension.get_or_insert(vector.len());
            if vector.len() != expected || expected == 0 {
                return Err(LlmError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            let matrix = matrix.get_or_insert_with(|| Array2::zeros((expected, texts.len())));
            let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            let scale = if norm > 0.0 { 1.0 / norm } else { 1.0 };
            let mut column = matrix.column_mut(range.start + offset);
            for (slot, value) in column.iter_mut().zip(vector) {
                *slot = value * scale;
            }
        }
    }

    Ok(matrix.unwrap_or_else(|| Array2::zeros((0, texts.len()))))
}

//! Index construction from raw text.

use docscope_llm::{embed_in_batches, CostTracker, TextEmbedder};
use docscope_types::{DocscopeError, Result, Settings};
use tracing::{info, instrument};

use crate::index::DocumentIndex;

/// Embed `documents` with the embedding service and build a
/// [`DocumentIndex`] over them.
///
/// Embedding requests are batched by `settings.service.max_batch_chars`
/// and dispatched with at most `settings.service.max_concurrency` in
/// flight; their cost accumulates in `cost`.
#[instrument(skip_all, fields(documents = documents.len()))]
pub async fn build_index(
    documents: Vec<String>,
    embedder: &dyn TextEmbedder,
    settings: &Settings,
    cost: &CostTracker,
) -> Result<DocumentIndex> {
    if documents.is_empty() {
        return Err(DocscopeError::invalid("document set is empty"));
    }

    let embeddings = embed_in_batches(
        embedder,
        &documents,
        settings.service.max_batch_chars,
        settings.service.max_concurrency,
        cost,
    )
    .await?;

    let index = DocumentIndex::from_parts(documents, embeddings, &settings.keywords)?;
    info!(index = %index.id(), cost = cost.total(), "Index ready");
    Ok(index)
}

//! Applying trained probes to the documents of an index.

use docscope_index::DocumentIndex;
use docscope_types::{IndexId, Result};
use ndarray::ArrayView2;
use tracing::debug;

use crate::state::ProbeWarning;

/// A trained model that scores embedding columns.
pub trait Probe {
    /// Per-document scores: a vector for binary probes, a matrix of class
    /// probabilities for classifiers.
    type Output;

    /// Identity of the index the probe was prepared against.
    fn trained_on(&self) -> IndexId;

    /// Score every column of `embeddings` (`D x N`).
    ///
    /// Fails with `NotTrained` before training and `DimensionMismatch` when
    /// `D` differs from the training dimension.
    fn apply(&self, embeddings: ArrayView2<f32>) -> Result<Self::Output>;
}

/// Scores plus any non-fatal warnings raised while computing them.
#[derive(Debug, Clone)]
pub struct Scored<T> {
    pub scores: T,
    pub warnings: Vec<ProbeWarning>,
}

/// Score every document of `index` with `probe`.
///
/// With `check_index` a probe trained on a different index still scores,
/// but the result carries an `IndexIdentityMismatch` warning.
pub fn score<P: Probe + ?Sized>(
    index: &DocumentIndex,
    probe: &P,
    check_index: bool,
) -> Result<Scored<P::Output>> {
    let warnings = if check_index {
        ProbeWarning::check_identity(probe.trained_on(), index.id())
            .into_iter()
            .collect()
    } else {
        Vec::new()
    };
    let scores = probe.apply(index.embeddings())?;
    debug!(documents = index.len(), warnings = warnings.len(), "Scored index");
    Ok(Scored { scores, warnings })
}

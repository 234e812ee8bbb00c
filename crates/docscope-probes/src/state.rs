//! Training lifecycle shared by every probe kind.

use std::fmt;
use std::sync::Arc;

use docscope_types::IndexId;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Progress of a probe through training.
///
/// `Untrained -> Materialized -> Trained`. Training documents are kept as
/// soon as they exist so that a failure while embedding can be retried
/// without regenerating text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeState<C> {
    /// Nothing generated yet
    Untrained,
    /// Training documents exist, embeddings do not
    Materialized { documents: Vec<String> },
    /// Embedded and fitted
    Trained {
        documents: Vec<String>,
        /// Training vectors, one column per training row
        embeddings: Arc<Array2<f32>>,
        coefficients: C,
    },
}

impl<C> Default for ProbeState<C> {
    fn default() -> Self {
        ProbeState::Untrained
    }
}

impl<C> ProbeState<C> {
    pub fn is_trained(&self) -> bool {
        matches!(self, ProbeState::Trained { .. })
    }

    pub fn documents(&self) -> Option<&[String]> {
        match self {
            ProbeState::Untrained => None,
            ProbeState::Materialized { documents } | ProbeState::Trained { documents, .. } => {
                Some(documents)
            }
        }
    }

    pub fn embeddings(&self) -> Option<&Arc<Array2<f32>>> {
        match self {
            ProbeState::Trained { embeddings, .. } => Some(embeddings),
            _ => None,
        }
    }

    pub fn coefficients(&self) -> Option<&C> {
        match self {
            ProbeState::Trained { coefficients, .. } => Some(coefficients),
            _ => None,
        }
    }

    /// Drop everything generated so far.
    pub fn reset(&mut self) {
        *self = ProbeState::Untrained;
    }
}

/// Non-fatal conditions found while training or scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeWarning {
    /// Probe trained on one index is applied to another
    IndexIdentityMismatch {
        trained_on: IndexId,
        used_with: IndexId,
    },
    /// Cross-validated accuracy at or below the configured threshold
    LowSeparability { accuracy: f64, threshold: f64 },
}

impl ProbeWarning {
    /// Identity check between the training index and the one in use.
    pub(crate) fn check_identity(trained_on: IndexId, used_with: IndexId) -> Option<Self> {
        (trained_on != used_with).then(|| {
            let warning = ProbeWarning::IndexIdentityMismatch {
                trained_on,
                used_with,
            };
            warn!(%trained_on, %used_with, "{warning}");
            warning
        })
    }

    pub(crate) fn check_separability(accuracy: f64, threshold: f64) -> Option<Self> {
        (accuracy <= threshold).then(|| {
            let warning = ProbeWarning::LowSeparability {
                accuracy,
                threshold,
            };
            warn!(accuracy, threshold, "{warning}");
            warning
        })
    }
}

impl fmt::Display for ProbeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeWarning::IndexIdentityMismatch { .. } => write!(
                f,
                "probe was trained on a different index; embeddings may not be comparable"
            ),
            ProbeWarning::LowSeparability {
                accuracy,
                threshold,
            } => write!(
                f,
                "cross-validated accuracy {accuracy:.3} is at or below {threshold:.3}; \
                 try a smaller lambda, different wording or more samples"
            ),
        }
    }
}

/// Outcome of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    /// Mean k-fold accuracy on the training set
    pub cv_accuracy: f64,
    pub warnings: Vec<ProbeWarning>,
}

impl TrainReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

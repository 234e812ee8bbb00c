//! Concept probes: a direction in embedding space for a named concept,
//! learned from rewrites of random documents.

use std::sync::Arc;

use docscope_index::DocumentIndex;
use docscope_llm::{CostTracker, ServiceContext};
use docscope_types::{DocId, DocscopeError, IndexId, ProbeSettings, Result};
use ndarray::{concatenate, Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::logistic::{sigmoid, Coefficients, Targets};
use crate::scorer::Probe;
use crate::state::{ProbeState, ProbeWarning, TrainReport};
use crate::training::{
    direction_vectors, document_embeddings, fit_and_validate, require_negatives, require_samples,
    rewrite_documents, sample_disjoint,
};

/// A concept probe and its training material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptProbe {
    concept: String,
    source_ids: Vec<DocId>,
    negative_ids: Vec<DocId>,
    index_id: IndexId,
    state: ProbeState<Array1<f64>>,
}

impl ConceptProbe {
    pub fn concept(&self) -> &str {
        &self.concept
    }

    /// Seed documents that were rewritten.
    pub fn source_ids(&self) -> &[DocId] {
        &self.source_ids
    }

    /// Raw documents used as the negative class.
    pub fn negative_ids(&self) -> &[DocId] {
        &self.negative_ids
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn state(&self) -> &ProbeState<Array1<f64>> {
        &self.state
    }

    pub fn rewritten_documents(&self) -> Option<&[String]> {
        self.state.documents()
    }

    /// Rewrite-minus-original vectors, one column per seed.
    pub fn direction_embeddings(&self) -> Option<&Arc<Array2<f32>>> {
        self.state.embeddings()
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.state.coefficients()
    }
}

impl Probe for ConceptProbe {
    type Output = Array1<f64>;

    fn trained_on(&self) -> IndexId {
        self.index_id
    }

    /// `sigmoid(w . x)` per document; 0.5 is maximally ambiguous.
    fn apply(&self, embeddings: ArrayView2<f32>) -> Result<Array1<f64>> {
        let w = self
            .coefficients()
            .ok_or_else(|| DocscopeError::NotTrained(self.concept.clone()))?;
        binary_scores(w, embeddings)
    }
}

/// Sigmoid scores of every column against binary coefficients.
pub(crate) fn binary_scores(w: &Array1<f64>, embeddings: ArrayView2<f32>) -> Result<Array1<f64>> {
    if embeddings.nrows() != w.len() {
        return Err(DocscopeError::DimensionMismatch {
            expected: w.len(),
            actual: embeddings.nrows(),
        });
    }
    Ok(embeddings.mapv(f64::from).t().dot(w).mapv(sigmoid))
}

/// Trains [`ConceptProbe`]s.
#[derive(Debug, Clone)]
pub struct ConceptTrainer {
    settings: ProbeSettings,
    services: ServiceContext,
}

impl ConceptTrainer {
    pub fn new(settings: ProbeSettings, services: ServiceContext) -> Self {
        Self { settings, services }
    }

    /// Sample seeds and negatives for a new, untrained probe.
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        index: &DocumentIndex,
        concept: &str,
        rng: &mut R,
    ) -> Result<ConceptProbe> {
        if concept.trim().is_empty() {
            return Err(DocscopeError::invalid("concept phrase is empty"));
        }
        require_samples(&self.settings)?;
        require_negatives(&self.settings)?;
        let negatives = self.settings.negative_multiplier * self.settings.num_samples;
        let mut groups =
            sample_disjoint(rng, index.len(), &[self.settings.num_samples, negatives])?;
        let negative_ids = groups.pop().unwrap_or_default();
        let source_ids = groups.pop().unwrap_or_default();

        Ok(ConceptProbe {
            concept: concept.to_string(),
            source_ids,
            negative_ids,
            index_id: index.id(),
            state: ProbeState::Untrained,
        })
    }

    /// Prepare and train in one step.
    pub async fn train_concept<R: Rng + Send + ?Sized>(
        &self,
        index: &DocumentIndex,
        concept: &str,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<(ConceptProbe, TrainReport)> {
        let mut probe = self.prepare(index, concept, rng)?;
        let report = self.train(&mut probe, index, rng, cost).await?;
        Ok((probe, report))
    }

    /// Advance `probe` to `Trained`, reusing whatever material it already
    /// has: existing rewrites are not regenerated and existing embeddings
    /// are not recomputed.
    #[instrument(skip_all, fields(concept = %probe.concept))]
    pub async fn train<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut ConceptProbe,
        index: &DocumentIndex,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<TrainReport> {
        let warnings: Vec<ProbeWarning> =
            ProbeWarning::check_identity(probe.index_id, index.id()).into_iter().collect();
        for &id in &probe.source_ids {
            index.check_id(id)?;
        }
        let negatives = document_embeddings(index, &probe.negative_ids)?;

        if let ProbeState::Untrained = probe.state {
            let template = self.services.template(&self.settings.rewrite_template)?;
            let documents = rewrite_documents(
                &self.services,
                &template,
                index,
                &probe.source_ids,
                &[probe.concept.as_str()],
                cost,
            )
            .await?;
            probe.state = ProbeState::Materialized { documents };
        }

        let embeddings = match &probe.state {
            ProbeState::Trained { embeddings, .. } => Arc::clone(embeddings),
            ProbeState::Materialized { documents } => {
                let rewritten = self.services.embed(documents, cost).await?;
                Arc::new(direction_vectors(index, &probe.source_ids, rewritten)?)
            }
            ProbeState::Untrained => {
                return Err(DocscopeError::NotTrained(probe.concept.clone()));
            }
        };
        if embeddings.nrows() != negatives.nrows() {
            return Err(DocscopeError::DimensionMismatch {
                expected: negatives.nrows(),
                actual: embeddings.nrows(),
            });
        }

        let x = concatenate(Axis(1), &[embeddings.view(), negatives.view()])
            .map_err(|e| DocscopeError::invalid(e.to_string()))?;
        let mut labels = vec![1.0; embeddings.ncols()];
        labels.extend(std::iter::repeat(-1.0).take(negatives.ncols()));

        let (coefficients, report) = fit_and_validate(
            Arc::new(x),
            Targets::Binary(labels),
            &self.settings,
            warnings,
            rng,
        )
        .await?;
        let Coefficients::Binary(coefficients) = coefficients else {
            return Err(DocscopeError::invalid("binary fit returned multiclass coefficients"));
        };

        let documents = probe.state.documents().map(<[String]>::to_vec).unwrap_or_default();
        probe.state = ProbeState::Trained {
            documents,
            embeddings,
            coefficients,
        };
        info!(
            accuracy = report.cv_accuracy,
            warnings = report.warnings.len(),
            cost = cost.total(),
            "Trained concept probe"
        );
        Ok(report)
    }

    /// Refit `probe`. With `overwrite` all rewrites and embeddings are
    /// regenerated; otherwise existing material is reused.
    pub async fn retrain<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut ConceptProbe,
        index: &DocumentIndex,
        overwrite: bool,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<TrainReport> {
        if overwrite {
            probe.state.reset();
        }
        self.train(probe, index, rng, cost).await
    }
}

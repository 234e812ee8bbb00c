//! Spectrum probes: a direction between two opposing concepts.

use std::sync::Arc;

use docscope_index::DocumentIndex;
use docscope_llm::{CostTracker, ServiceContext};
use docscope_types::{DocId, DocscopeError, IndexId, ProbeSettings, Result};
use ndarray::{Array1, Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::concept::binary_scores;
use crate::logistic::{Coefficients, Targets};
use crate::scorer::Probe;
use crate::state::{ProbeState, ProbeWarning, TrainReport};
use crate::training::{
    direction_vectors, fit_and_validate, require_samples, rewrite_documents, sample_disjoint,
};

/// A spectrum probe. Scores near 0 lean towards the first pole, near 1
/// towards the second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumProbe {
    poles: (String, String),
    source_ids: Vec<DocId>,
    index_id: IndexId,
    /// Documents and embedding columns: every seed through the first pole,
    /// then every seed through the second
    state: ProbeState<Array1<f64>>,
}

impl SpectrumProbe {
    pub fn poles(&self) -> (&str, &str) {
        (&self.poles.0, &self.poles.1)
    }

    pub fn source_ids(&self) -> &[DocId] {
        &self.source_ids
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

    pub fn direction_embeddings(&self) -> Option<&Arc<Array2<f32>>> {
        self.state.embeddings()
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.state.coefficients()
    }

    fn name(&self) -> String {
        format!("{} <-> {}", self.poles.0, self.poles.1)
    }
}

impl Probe for SpectrumProbe {
    type Output = Array1<f64>;

    fn trained_on(&self) -> IndexId {
        self.index_id
    }

    fn apply(&self, embeddings: ArrayView2<f32>) -> Result<Array1<f64>> {
        let w = self
            .coefficients()
            .ok_or_else(|| DocscopeError::NotTrained(self.name()))?;
        binary_scores(w, embeddings)
    }
}

/// Trains [`SpectrumProbe`]s.
#[derive(Debug, Clone)]
pub struct SpectrumTrainer {
    settings: ProbeSettings,
    services: ServiceContext,
}

impl SpectrumTrainer {
    pub fn new(settings: ProbeSettings, services: ServiceContext) -> Self {
        Self { settings, services }
    }

    /// Sample seeds for a new, untrained probe between `low` and `high`.
    pub fn prepare<R: Rng + ?Sized>(
        &self,
        index: &DocumentIndex,
        low: &str,
        high: &str,
        rng: &mut R,
    ) -> Result<SpectrumProbe> {
        if low.trim().is_empty() || high.trim().is_empty() {
            return Err(DocscopeError::invalid("spectrum poles must not be empty"));
        }
        if low == high {
            return Err(DocscopeError::invalid("spectrum poles must differ"));
        }
        require_samples(&self.settings)?;
        let source_ids = sample_disjoint(rng, index.len(), &[self.settings.num_samples])?
            .pop()
            .unwrap_or_default();

        Ok(SpectrumProbe {
            poles: (low.to_string(), high.to_string()),
            source_ids,
            index_id: index.id(),
            state: ProbeState::Untrained,
        })
    }

    /// Prepare and train in one step.
    pub async fn train_spectrum<R: Rng + Send + ?Sized>(
        &self,
        index: &DocumentIndex,
        low: &str,
        high: &str,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<(SpectrumProbe, TrainReport)> {
        let mut probe = self.prepare(index, low, high, rng)?;
        let report = self.train(&mut probe, index, rng, cost).await?;
        Ok((probe, report))
    }

    /// Advance `probe` to `Trained`, reusing existing rewrites and embeddings.
    #[instrument(skip_all, fields(spectrum = %probe.name()))]
    pub async fn train<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut SpectrumProbe,
        index: &DocumentIndex,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<TrainReport> {
        let warnings: Vec<ProbeWarning> =
            ProbeWarning::check_identity(probe.index_id, index.id()).into_iter().collect();
        for &id in &probe.source_ids {
            index.check_id(id)?;
        }

        if let ProbeState::Untrained = probe.state {
            let template = self.services.template(&self.settings.rewrite_template)?;
            let documents = rewrite_documents(
                &self.services,
                &template,
                index,
                &probe.source_ids,
                &[probe.poles.0.as_str(), probe.poles.1.as_str()],
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
            ProbeState::Untrained => return Err(DocscopeError::NotTrained(probe.name())),
        };

        let half = probe.source_ids.len();
        if embeddings.ncols() != 2 * half {
            return Err(DocscopeError::invalid(format!(
                "expected {} spectrum vectors, found {}",
                2 * half,
                embeddings.ncols()
            )));
        }
        let mut labels = vec![-1.0; half];
        labels.extend(std::iter::repeat(1.0).take(half));

        let (coefficients, report) = fit_and_validate(
            Arc::clone(&embeddings),
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
            "Trained spectrum probe"
        );
        Ok(report)
    }

    /// Refit `probe`; `overwrite` regenerates rewrites and embeddings.
    pub async fn retrain<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut SpectrumProbe,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scorer::score;
    use docscope_llm::{InMemoryTemplates, MockEmbedder, MockGenerator, Prompt};
    use docscope_types::KeywordSettings;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const DIM: usize = 5;

    fn index() -> DocumentIndex {
        let documents: Vec<String> = (0..12).map(|i| format!("note {i}")).collect();
        let embeddings =
            Array2::from_shape_fn((DIM, 12), |(r, c)| if r == c % 3 { 1.0 } else { 0.0 });
        DocumentIndex::from_parts(documents, embeddings, &KeywordSettings::default()).unwrap()
    }

    /// "casual" rewrites move along +axis 3, "formal" rewrites along +axis 4.
    fn services(index: &DocumentIndex) -> ServiceContext {
        let mut embedder = MockEmbedder::new(DIM);
        for (pos, text) in index.documents().iter().enumerate() {
            for (pole, axis) in [("casual", 3), ("formal", 4)] {
                let mut vector = index.embedding(pos + 1).to_vec();
                vector[axis] += 1.0;
                embedder = embedder.with_vector(format!("{pole}:{text}"), vector);
            }
        }
        let generator = MockGenerator::with_responder(|prompt: &Prompt| {
            let pole = if prompt.user.contains("\"casual\"") { "casual" } else { "formal" };
            let document = prompt
                .user
                .split("Document:\n")
                .nth(1)
                .and_then(|rest| rest.lines().next())
                .unwrap_or_default();
            Ok(format!("Rewritten Document: {pole}:{document}"))
        });
        ServiceContext::new(
            Arc::new(generator),
            Arc::new(embedder),
            Arc::new(InMemoryTemplates::with_defaults()),
        )
    }

    fn settings() -> ProbeSettings {
        ProbeSettings {
            num_samples: 4,
            lambda: 1e-3,
            cv_folds: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_train_spectrum() {
        let index = index();
        let trainer = SpectrumTrainer::new(settings(), services(&index));
        let mut rng = StdRng::seed_from_u64(3);
        let (probe, report) = trainer
            .train_spectrum(&index, "casual", "formal", &mut rng, &CostTracker::new())
            .await
            .unwrap();

        let documents = probe.rewritten_documents().unwrap();
        assert_eq!(documents.len(), 8);
        assert!(documents[..4].iter().all(|d| d.starts_with("casual:")));
        assert!(documents[4..].iter().all(|d| d.starts_with("formal:")));
        assert_eq!(probe.direction_embeddings().unwrap().ncols(), 8);
        assert!(report.cv_accuracy > 0.9);

        let w = probe.coefficients().unwrap();
        assert!(w[4] > w[3]);

        // a document pushed towards "formal" scores above one pushed towards "casual"
        let mut shifted = Array2::<f32>::zeros((DIM, 2));
        shifted[[3, 0]] = 1.0;
        shifted[[4, 1]] = 1.0;
        let scores = probe.apply(shifted.view()).unwrap();
        assert!(scores[0] < 0.5 && scores[1] > 0.5);

        let scored = score(&index, &probe, true).unwrap();
        assert_eq!(scored.scores.len(), 12);
    }

    #[tokio::test]
    async fn test_retrain_without_overwrite_keeps_embeddings() {
        let index = index();
        let trainer = SpectrumTrainer::new(settings(), services(&index));
        let mut rng = StdRng::seed_from_u64(8);
        let cost = CostTracker::new();
        let (mut probe, _) = trainer
            .train_spectrum(&index, "casual", "formal", &mut rng, &cost)
            .await
            .unwrap();
        let before = Arc::clone(probe.direction_embeddings().unwrap());
        trainer
            .retrain(&mut probe, &index, false, &mut rng, &cost)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&before, probe.direction_embeddings().unwrap()));
    }

    #[test]
    fn test_prepare_validation() {
        let index = index();
        let trainer = SpectrumTrainer::new(settings(), services(&index));
        let mut rng = StdRng::seed_from_u64(0);
        assert!(trainer.prepare(&index, "", "formal", &mut rng).is_err());
        assert!(trainer.prepare(&index, "same", "same", &mut rng).is_err());
        let probe = trainer.prepare(&index, "casual", "formal", &mut rng).unwrap();
        assert_eq!(probe.poles(), ("casual", "formal"));
        assert_eq!(probe.source_ids().len(), 4);
    }
}

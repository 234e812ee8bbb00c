//! Multi-class classifier probes over raw document embeddings.

use std::collections::BTreeSet;
use std::sync::Arc;

use docscope_index::DocumentIndex;
use docscope_llm::{try_join_bounded, CostTracker, ServiceContext, NOT_PROVIDED};
use docscope_types::{DocId, DocscopeError, IndexId, ProbeSettings, Result};
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::logistic::{argmax, softmax, Coefficients, Targets};
use crate::scorer::Probe;
use crate::state::{ProbeState, ProbeWarning, TrainReport};
use crate::training::{document_embeddings, fit_and_validate, require_samples};

/// Caller-labelled documents of the index used as training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledExamples {
    pub document_ids: Vec<DocId>,
    /// 1-based label per document
    pub labels: Vec<usize>,
}

/// A trained (or in-training) multi-class classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierProbe {
    labels: Vec<String>,
    label_descriptions: Option<Vec<String>>,
    examples: Option<LabeledExamples>,
    /// 1-based label of each training row
    training_labels: Vec<usize>,
    index_id: IndexId,
    /// Coefficients are `D x labels`
    state: ProbeState<Array2<f64>>,
}

impl ClassifierProbe {
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn label_descriptions(&self) -> Option<&[String]> {
        self.label_descriptions.as_deref()
    }

    pub fn examples(&self) -> Option<&LabeledExamples> {
        self.examples.as_ref()
    }

    pub fn training_documents(&self) -> Option<&[String]> {
        self.state.documents()
    }

    pub fn training_labels(&self) -> &[usize] {
        &self.training_labels
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn state(&self) -> &ProbeState<Array2<f64>> {
        &self.state
    }

    pub fn embeddings(&self) -> Option<&Arc<Array2<f32>>> {
        self.state.embeddings()
    }

    pub fn coefficients(&self) -> Option<&Array2<f64>> {
        self.state.coefficients()
    }

    fn name(&self) -> String {
        self.labels.join("/")
    }
}

impl Probe for ClassifierProbe {
    /// `N x labels` probabilities; each row sums to 1
    type Output = Array2<f64>;

    fn trained_on(&self) -> IndexId {
        self.index_id
    }

    fn apply(&self, embeddings: ArrayView2<f32>) -> Result<Array2<f64>> {
        let w = self
            .coefficients()
            .ok_or_else(|| DocscopeError::NotTrained(self.name()))?;
        if embeddings.nrows() != w.nrows() {
            return Err(DocscopeError::DimensionMismatch {
                expected: w.nrows(),
                actual: embeddings.nrows(),
            });
        }
        let scores = embeddings.mapv(f64::from).t().dot(w);
        let mut probabilities = Array2::zeros(scores.raw_dim());
        for (mut out, row) in probabilities
            .axis_iter_mut(Axis(0))
            .zip(scores.axis_iter(Axis(0)))
        {
            out.assign(&softmax(row));
        }
        Ok(probabilities)
    }
}

/// Most probable 1-based label per row of a probability matrix.
pub fn best_labels(probabilities: &Array2<f64>) -> Vec<usize> {
    probabilities
        .axis_iter(Axis(0))
        .map(|row| argmax(row) + 1)
        .collect()
}

/// Trains [`ClassifierProbe`]s.
#[derive(Debug, Clone)]
pub struct ClassifierTrainer {
    settings: ProbeSettings,
    services: ServiceContext,
}

impl ClassifierTrainer {
    pub fn new(settings: ProbeSettings, services: ServiceContext) -> Self {
        Self { settings, services }
    }

    /// Validate the label set and optional examples for a new probe.
    pub fn prepare(
        &self,
        index: &DocumentIndex,
        labels: Vec<String>,
        label_descriptions: Option<Vec<String>>,
        examples: Option<LabeledExamples>,
    ) -> Result<ClassifierProbe> {
        let distinct: BTreeSet<&str> = labels.iter().map(|l| l.trim()).collect();
        if labels.len() < 2 || distinct.len() != labels.len() || distinct.contains("") {
            return Err(DocscopeError::invalid(
                "a classifier needs at least two distinct, non-empty labels",
            ));
        }
        if let Some(descriptions) = &label_descriptions {
            if descriptions.len() != labels.len() {
                return Err(DocscopeError::invalid(format!(
                    "{} label descriptions for {} labels",
                    descriptions.len(),
                    labels.len()
                )));
            }
        }
        if let Some(examples) = &examples {
            if examples.document_ids.len() != examples.labels.len() {
                return Err(DocscopeError::invalid(format!(
                    "{} example documents but {} example labels",
                    examples.document_ids.len(),
                    examples.labels.len()
                )));
            }
            if examples.document_ids.is_empty() {
                return Err(DocscopeError::invalid("labelled examples are empty"));
            }
            if let Some(bad) = examples.labels.iter().find(|&&l| l == 0 || l > labels.len()) {
                return Err(DocscopeError::invalid(format!(
                    "example label {bad} is outside 1..={}",
                    labels.len()
                )));
            }
            for &id in &examples.document_ids {
                index.check_id(id)?;
            }
        } else {
            require_samples(&self.settings)?;
        }

        Ok(ClassifierProbe {
            labels,
            label_descriptions,
            examples,
            training_labels: Vec::new(),
            index_id: index.id(),
            state: ProbeState::Untrained,
        })
    }

    /// Prepare and train in one step.
    pub async fn train_classifier<R: Rng + Send + ?Sized>(
        &self,
        index: &DocumentIndex,
        labels: Vec<String>,
        label_descriptions: Option<Vec<String>>,
        examples: Option<LabeledExamples>,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<(ClassifierProbe, TrainReport)> {
        let mut probe = self.prepare(index, labels, label_descriptions, examples)?;
        let report = self.train(&mut probe, index, rng, cost).await?;
        Ok((probe, report))
    }

    /// Generate `num_samples` synthetic documents per label, with at most
    /// `max_concurrency` requests in flight.
    async fn synthesize(
        &self,
        probe: &ClassifierProbe,
        cost: &CostTracker,
    ) -> Result<(Vec<String>, Vec<usize>)> {
        let template = self.services.template(&self.settings.example_template)?;
        let samples = self.settings.num_samples;
        let requests: Vec<(usize, usize)> = (1..=probe.labels.len())
            .flat_map(|label| (1..=samples).map(move |sample| (label, sample)))
            .collect();

        let template = &template;
        let generate = |label: usize, sample: usize| async move {
            let description = probe
                .label_descriptions
                .as_ref()
                .map(|d| d[label - 1].as_str())
                .filter(|d| !d.trim().is_empty())
                .unwrap_or(NOT_PROVIDED);
            let number = sample.to_string();
            self.services
                .generate(
                    template,
                    &[
                        ("label", probe.labels[label - 1].as_str()),
                        ("description", description),
                        ("sample_number", number.as_str()),
                    ],
                    cost,
                )
                .await
        };
        let documents = try_join_bounded(
            requests.iter().map(|&(label, sample)| generate(label, sample)),
            self.services.max_concurrency,
        )
        .await?;

        debug!(documents = documents.len(), "Generated synthetic examples");
        Ok((documents, requests.into_iter().map(|(label, _)| label).collect()))
    }

    /// Advance `probe` to `Trained`, reusing existing documents and
    /// embeddings.
    #[instrument(skip_all, fields(labels = probe.labels.len()))]
    pub async fn train<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut ClassifierProbe,
        index: &DocumentIndex,
        rng: &mut R,
        cost: &CostTracker,
    ) -> Result<TrainReport> {
        let warnings: Vec<ProbeWarning> =
            ProbeWarning::check_identity(probe.index_id, index.id()).into_iter().collect();

        if let ProbeState::Untrained = probe.state {
            let (documents, training_labels) = match &probe.examples {
                Some(examples) => (
                    examples
                        .document_ids
                        .iter()
                        .map(|&id| index.document(id).map(str::to_string))
                        .collect::<Result<Vec<_>>>()?,
                    examples.labels.clone(),
                ),
                None => self.synthesize(probe, cost).await?,
            };
            probe.training_labels = training_labels;
            probe.state = ProbeState::Materialized { documents };
        }

        let embeddings = match (&probe.state, &probe.examples) {
            (ProbeState::Trained { embeddings, .. }, _) => Arc::clone(embeddings),
            (ProbeState::Materialized { .. }, Some(examples)) => {
                Arc::new(document_embeddings(index, &examples.document_ids)?)
            }
            (ProbeState::Materialized { documents }, None) => {
                Arc::new(self.services.embed(documents, cost).await?)
            }
            (ProbeState::Untrained, _) => return Err(DocscopeError::NotTrained(probe.name())),
        };
        if embeddings.nrows() != index.dimension() {
            return Err(DocscopeError::DimensionMismatch {
                expected: index.dimension(),
                actual: embeddings.nrows(),
            });
        }

        let targets = Targets::Multiclass {
            classes: probe.training_labels.iter().map(|l| l - 1).collect(),
            n_classes: probe.labels.len(),
        };
        let (coefficients, report) = fit_and_validate(
            Arc::clone(&embeddings),
            targets,
            &self.settings,
            warnings,
            rng,
        )
        .await?;
        let Coefficients::Multiclass(coefficients) = coefficients else {
            return Err(DocscopeError::invalid("multiclass fit returned binary coefficients"));
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
            "Trained classifier"
        );
        Ok(report)
    }

    /// Refit `probe`; `overwrite` regenerates training documents and
    /// embeddings.
    pub async fn retrain<R: Rng + Send + ?Sized>(
        &self,
        probe: &mut ClassifierProbe,
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

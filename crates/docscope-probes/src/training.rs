//! Steps shared by the probe trainers: seed sampling, concurrent rewrites,
//! direction vectors and fit-plus-validate.

use std::sync::Arc;

use docscope_index::DocumentIndex;
use docscope_llm::{try_join_bounded, CostTracker, ServiceContext, Template};
use docscope_types::{DocId, DocscopeError, ProbeSettings, Result};
use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::crossval::CrossValidator;
use crate::logistic::{Coefficients, Targets};
use crate::state::{ProbeWarning, TrainReport};

/// Draw disjoint random groups of document ids with the given sizes.
pub(crate) fn sample_disjoint<R: Rng + ?Sized>(
    rng: &mut R,
    n_documents: usize,
    sizes: &[usize],
) -> Result<Vec<Vec<DocId>>> {
    let total: usize = sizes.iter().sum();
    if total > n_documents {
        return Err(DocscopeError::invalid(format!(
            "need {total} distinct documents but the index has {n_documents}"
        )));
    }
    let drawn = rand::seq::index::sample(rng, n_documents, total).into_vec();
    let mut groups = Vec::with_capacity(sizes.len());
    let mut start = 0;
    for &size in sizes {
        groups.push(drawn[start..start + size].iter().map(|pos| pos + 1).collect());
        start += size;
    }
    Ok(groups)
}

/// Rewrite every seed document through the lens of each of `concepts`, with
/// at most `services.max_concurrency` requests in flight overall.
///
/// Rewrites come back concept-major: all seeds for `concepts[0]`, then all
/// seeds for `concepts[1]`, and so on.
pub(crate) async fn rewrite_documents(
    services: &ServiceContext,
    template: &Template,
    index: &DocumentIndex,
    seeds: &[DocId],
    concepts: &[&str],
    cost: &CostTracker,
) -> Result<Vec<String>> {
    let texts = seeds
        .iter()
        .map(|&id| index.document(id))
        .collect::<Result<Vec<_>>>()?;
    let texts = &texts;
    let requests = concepts
        .iter()
        .flat_map(|&concept| texts.iter().map(move |&text| (concept, text)));
    let rewrites = try_join_bounded(
        requests.map(|(concept, text)| async move {
            services
                .generate(template, &[("concept", concept), ("document", text)], cost)
                .await
        }),
        services.max_concurrency,
    )
    .await?;
    debug!(?concepts, rewrites = rewrites.len(), "Rewrote seed documents");
    Ok(rewrites)
}

/// Subtract each seed's original embedding from its rewrite's embedding.
///
/// `rewritten` holds one column per rewrite; column `i` belongs to
/// `seeds[i % seeds.len()]`, so several rewrite groups can be stacked.
pub(crate) fn direction_vectors(
    index: &DocumentIndex,
    seeds: &[DocId],
    mut rewritten: Array2<f32>,
) -> Result<Array2<f32>> {
    if rewritten.nrows() != index.dimension() {
        return Err(DocscopeError::DimensionMismatch {
            expected: index.dimension(),
            actual: rewritten.nrows(),
        });
    }
    if seeds.is_empty() || rewritten.ncols() % seeds.len() != 0 {
        return Err(DocscopeError::invalid(
            "rewrite embeddings do not line up with the seed documents",
        ));
    }
    for &seed in seeds {
        index.check_id(seed)?;
    }
    for (i, mut column) in rewritten.axis_iter_mut(Axis(1)).enumerate() {
        column -= &index.embedding(seeds[i % seeds.len()]);
    }
    Ok(rewritten)
}

/// Raw index embeddings of the given documents, one column each.
pub(crate) fn document_embeddings(index: &DocumentIndex, ids: &[DocId]) -> Result<Array2<f32>> {
    for &id in ids {
        index.check_id(id)?;
    }
    let columns: Vec<usize> = ids.iter().map(|id| id - 1).collect();
    Ok(index.embeddings().select(Axis(1), &columns))
}

/// Fit the model, cross-validate it and collect the resulting warnings.
///
/// The fit and the folds run on the blocking pool, seeded from `rng`.
pub(crate) async fn fit_and_validate<R: Rng + Send + ?Sized>(
    x: Arc<Array2<f32>>,
    targets: Targets,
    settings: &ProbeSettings,
    mut warnings: Vec<ProbeWarning>,
    rng: &mut R,
) -> Result<(Coefficients, TrainReport)> {
    if x.ncols() != targets.len() || targets.is_empty() {
        return Err(DocscopeError::invalid(format!(
            "{} training vectors for {} targets",
            x.ncols(),
            targets.len()
        )));
    }
    let seed: u64 = rng.random();
    let lambda = settings.lambda;
    let max_iterations = settings.max_iterations;
    let folds = settings.cv_folds.min(targets.len());

    let (coefficients, cv_accuracy) = tokio::task::spawn_blocking(move || {
        let x = x.mapv(f64::from);
        let coefficients = Coefficients::fit(x.view(), &targets, lambda, max_iterations);
        let mut rng = StdRng::seed_from_u64(seed);
        let cv_accuracy = CrossValidator::new(folds, lambda, max_iterations)
            .accuracy(x.view(), &targets, &mut rng)?;
        Ok::<_, DocscopeError>((coefficients, cv_accuracy))
    })
    .await
    .map_err(|e| DocscopeError::Service(format!("training task failed: {e}")))??;

    warnings.extend(ProbeWarning::check_separability(
        cv_accuracy,
        settings.accuracy_threshold,
    ));

    Ok((
        coefficients,
        TrainReport {
            cv_accuracy,
            warnings,
        },
    ))
}

/// Reject a zero-sample configuration.
pub(crate) fn require_samples(settings: &ProbeSettings) -> Result<()> {
    if settings.num_samples == 0 {
        return Err(DocscopeError::invalid("num_samples must be at least 1"));
    }
    Ok(())
}

/// Reject a configuration that would draw no negative documents.
pub(crate) fn require_negatives(settings: &ProbeSettings) -> Result<()> {
    if settings.negative_multiplier == 0 {
        return Err(DocscopeError::invalid("negative_multiplier must be at least 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscope_llm::{InMemoryTemplates, MockEmbedder, MockGenerator};
    use docscope_types::KeywordSettings;

    fn index() -> DocumentIndex {
        let documents = (1..=8).map(|i| format!("document {i}")).collect();
        let embeddings = Array2::from_shape_fn((3, 8), |(r, c)| if r == c % 3 { 1.0 } else { 0.0 });
        DocumentIndex::from_parts(documents, embeddings, &KeywordSettings::default()).unwrap()
    }

    #[test]
    fn test_sample_disjoint() {
        let mut rng = StdRng::seed_from_u64(11);
        let groups = sample_disjoint(&mut rng, 8, &[3, 4]).unwrap();
        assert_eq!(groups[0].len(), 3);
        assert_eq!(groups[1].len(), 4);
        assert!(groups[0].iter().all(|id| !groups[1].contains(id)));
        assert!(groups.concat().iter().all(|&id| (1..=8).contains(&id)));

        assert!(sample_disjoint(&mut rng, 8, &[5, 4]).is_err());
    }

    #[test]
    fn test_direction_vectors() {
        let index = index();
        let rewritten = Array2::from_shape_fn((3, 4), |(r, _)| if r == 2 { 1.0 } else { 0.0 });
        let directions = direction_vectors(&index, &[1, 2], rewritten).unwrap();
        // seed 1 is e0, seed 2 is e1
        assert_eq!(directions.column(0).to_vec(), vec![-1.0, 0.0, 1.0]);
        assert_eq!(directions.column(1).to_vec(), vec![0.0, -1.0, 1.0]);
        assert_eq!(directions.column(2).to_vec(), vec![-1.0, 0.0, 1.0]);

        let wrong = Array2::zeros((5, 2));
        assert!(direction_vectors(&index, &[1, 2], wrong).is_err());
    }

    #[test]
    fn test_direction_vectors_reject_foreign_seeds() {
        let index = index();
        let rewritten = Array2::<f32>::zeros((3, 2));
        let result = direction_vectors(&index, &[2, 9], rewritten);
        assert!(matches!(result, Err(DocscopeError::InvalidArgument(_))));
        assert!(direction_vectors(&index, &[0], Array2::zeros((3, 1))).is_err());
    }

    #[tokio::test]
    async fn test_rewrites_are_concept_major() {
        let services = ServiceContext::new(
            Arc::new(MockGenerator::echo()),
            Arc::new(MockEmbedder::new(3)),
            Arc::new(InMemoryTemplates::with_defaults()),
        )
        .with_max_concurrency(2);
        let template = Template::new("{{concept}} / {{document}}");

        let rewrites = rewrite_documents(
            &services,
            &template,
            &index(),
            &[3, 1],
            &["formal", "casual"],
            &CostTracker::new(),
        )
        .await
        .unwrap();
        assert_eq!(
            rewrites,
            vec![
                "formal / document 3",
                "formal / document 1",
                "casual / document 3",
                "casual / document 1",
            ]
        );
    }

    fn separable() -> (Arc<Array2<f32>>, Targets) {
        let x = Array2::from_shape_fn((2, 8), |(r, c)| match (r, c < 4) {
            (0, true) | (1, false) => 1.0,
            _ => 0.1 * c as f32,
        });
        let labels = (0..8).map(|c| if c < 4 { 1.0 } else { -1.0 }).collect();
        (Arc::new(x), Targets::Binary(labels))
    }

    #[tokio::test]
    async fn test_fit_and_validate_is_reproducible() {
        let settings = ProbeSettings {
            cv_folds: 4,
            ..ProbeSettings::default()
        };
        let (x, targets) = separable();

        let (first, first_report) = fit_and_validate(
            Arc::clone(&x),
            targets.clone(),
            &settings,
            Vec::new(),
            &mut StdRng::seed_from_u64(3),
        )
        .await
        .unwrap();
        let (second, second_report) =
            fit_and_validate(x, targets, &settings, Vec::new(), &mut StdRng::seed_from_u64(3))
                .await
                .unwrap();

        assert_eq!(first, second);
        assert_eq!(first_report.cv_accuracy, second_report.cv_accuracy);
        assert!(first_report.cv_accuracy > 0.9);
        assert!(!first_report.has_warnings());
    }

    #[tokio::test]
    async fn test_fit_and_validate_rejects_mismatched_targets() {
        let (x, _) = separable();
        let result = fit_and_validate(
            x,
            Targets::Binary(vec![1.0, -1.0]),
            &ProbeSettings::default(),
            Vec::new(),
            &mut StdRng::seed_from_u64(0),
        )
        .await;
        assert!(matches!(result, Err(DocscopeError::InvalidArgument(_))));
    }

    #[test]
    fn test_require_negatives() {
        assert!(require_negatives(&ProbeSettings::default()).is_ok());
        let settings = ProbeSettings {
            negative_multiplier: 0,
            ..ProbeSettings::default()
        };
        assert!(require_negatives(&settings).is_err());
    }

    #[test]
    fn test_document_embeddings() {
        let index = index();
        let selected = document_embeddings(&index, &[3, 4]).unwrap();
        assert_eq!(selected.dim(), (3, 2));
        assert_eq!(selected.column(1).to_vec(), vec![1.0, 0.0, 0.0]);
        assert!(document_embeddings(&index, &[9]).is_err());
    }
}

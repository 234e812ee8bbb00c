//! End-to-end probe tests: training against an index, scoring, retraining
//! and feeding classifier output back into topic levels.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;

use docscope_index::build_index;
use docscope_llm::{CostTracker, MockEmbedder};
use docscope_probes::{
    best_labels, score, ClassifierTrainer, ConceptTrainer, LabeledExamples, ProbeState,
    ProbeWarning, SpectrumTrainer,
};
use docscope_topics::{TopicHierarchyManager, TopicTreeBuilder};
use docscope_types::{DocscopeError, LevelKey};
use e2e_tests::{assert_topic_invariants, block_index, themed_corpus, TestHarness};

async fn text_index(harness: &TestHarness) -> docscope_index::DocumentIndex {
    let embedder = MockEmbedder::new(TestHarness::DIMENSION);
    build_index(themed_corpus(), &embedder, &harness.settings, &CostTracker::new())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_concept_probe_lifecycle() {
    let harness = TestHarness::new();
    let index = text_index(&harness).await;
    let trainer = ConceptTrainer::new(harness.settings.probes.clone(), harness.services.clone());
    let mut rng = StdRng::seed_from_u64(7);
    let cost = CostTracker::new();

    let (mut probe, report) = trainer
        .train_concept(&index, "formality", &mut rng, &cost)
        .await
        .unwrap();
    assert!(probe.state().is_trained());
    assert_eq!(probe.source_ids().len(), 3);
    assert_eq!(probe.negative_ids().len(), 3);
    assert!(probe
        .source_ids()
        .iter()
        .all(|id| !probe.negative_ids().contains(id)));
    assert!((0.0..=1.0).contains(&report.cv_accuracy));
    for rewrite in probe.rewritten_documents().unwrap() {
        assert!(rewrite.starts_with("formally, "));
    }

    let scores = score(&index, &probe, true).unwrap();
    assert_eq!(scores.scores.len(), index.len());
    assert!(scores.scores.iter().all(|s| (0.0..=1.0).contains(s)));
    assert!(scores.warnings.is_empty());

    // refit only: same embeddings object
    let before = Arc::clone(probe.direction_embeddings().unwrap());
    trainer
        .retrain(&mut probe, &index, false, &mut rng, &cost)
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&before, probe.direction_embeddings().unwrap()));

    // overwrite: regenerated from scratch
    trainer
        .retrain(&mut probe, &index, true, &mut rng, &cost)
        .await
        .unwrap();
    assert!(!Arc::ptr_eq(&before, probe.direction_embeddings().unwrap()));
}

#[tokio::test]
async fn test_scoring_another_index_warns() {
    let harness = TestHarness::new();
    let index = text_index(&harness).await;
    let other = text_index(&harness).await;
    let trainer = SpectrumTrainer::new(harness.settings.probes.clone(), harness.services.clone());
    let mut rng = StdRng::seed_from_u64(3);

    let (probe, _) = trainer
        .train_spectrum(&index, "casual", "formal", &mut rng, &CostTracker::new())
        .await
        .unwrap();

    let scored = score(&other, &probe, true).unwrap();
    assert_eq!(scored.scores.len(), other.len());
    assert_eq!(
        scored.warnings,
        vec![ProbeWarning::IndexIdentityMismatch {
            trained_on: index.id(),
            used_with: other.id(),
        }]
    );
    assert!(score(&other, &probe, false).unwrap().warnings.is_empty());
}

#[tokio::test]
async fn test_untrained_probe_cannot_score() {
    let harness = TestHarness::new();
    let index = text_index(&harness).await;
    let trainer = ConceptTrainer::new(harness.settings.probes.clone(), harness.services.clone());
    let probe = trainer
        .prepare(&index, "formality", &mut StdRng::seed_from_u64(1))
        .unwrap();
    assert!(matches!(probe.state(), ProbeState::Untrained));
    assert!(matches!(
        score(&index, &probe, true),
        Err(DocscopeError::NotTrained(_))
    ));
}

/// Classifier predictions become a custom topic level and a tree.
#[tokio::test]
async fn test_classifier_to_custom_topics() {
    let harness = TestHarness::new();
    let cost = CostTracker::new();
    let mut index = block_index(2, 5);
    let trainer =
        ClassifierTrainer::new(harness.settings.probes.clone(), harness.services.clone());
    let labels = vec!["first group".to_string(), "second group".to_string()];
    let examples = LabeledExamples {
        document_ids: vec![1, 2, 6, 7],
        labels: vec![1, 1, 2, 2],
    };

    let (probe, _) = trainer
        .train_classifier(
            &index,
            labels.clone(),
            None,
            Some(examples),
            &mut StdRng::seed_from_u64(5),
            &cost,
        )
        .await
        .unwrap();
    let probabilities = score(&index, &probe, true).unwrap().scores;
    assert_eq!(probabilities.dim(), (10, 2));
    let predicted = best_labels(&probabilities);
    assert_eq!(predicted, vec![1, 1, 1, 1, 1, 2, 2, 2, 2, 2]);

    let assignment: Vec<i64> = predicted.iter().map(|&l| l as i64).collect();
    let manager = TopicHierarchyManager::new(harness.settings.topics.clone());
    let key = manager
        .build_custom_topics(&mut index, &assignment, "group", Some(labels.as_slice()), &cost)
        .await
        .unwrap();
    assert_topic_invariants(&index);

    let tree = TopicTreeBuilder::default().build(&index, &[key]).unwrap();
    let rendered = tree.render();
    assert!(rendered.contains("first group (5 documents, 50.0%)"));
    assert!(rendered.contains("second group (5 documents, 50.0%)"));
    assert_eq!(
        index.topic_level(&LevelKey::from("group")).unwrap().len(),
        2
    );
}

/// Synthetic examples are generated per label when none are supplied.
#[tokio::test]
async fn test_classifier_with_synthetic_examples() {
    let harness = TestHarness::new();
    let index = text_index(&harness).await;
    let trainer =
        ClassifierTrainer::new(harness.settings.probes.clone(), harness.services.clone());
    let labels = vec!["programming".to_string(), "cooking".to_string(), "sport".to_string()];

    let (probe, report) = trainer
        .train_classifier(
            &index,
            labels,
            Some(vec![
                "software".to_string(),
                "food".to_string(),
                "exercise".to_string(),
            ]),
            None,
            &mut StdRng::seed_from_u64(9),
            &CostTracker::new(),
        )
        .await
        .unwrap();
    assert_eq!(probe.training_documents().unwrap().len(), 9);
    assert_eq!(probe.training_labels(), &[1, 1, 1, 2, 2, 2, 3, 3, 3]);
    assert_eq!(
        probe.training_documents().unwrap()[0],
        "an example about programming"
    );
    assert!((0.0..=1.0).contains(&report.cv_accuracy));

    let probabilities = score(&index, &probe, true).unwrap().scores;
    assert_eq!(probabilities.dim(), (index.len(), 3));
    for row in probabilities.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-9);
    }
}

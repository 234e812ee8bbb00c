//! End-to-end test infrastructure for docscope.
//!
//! Provides a shared TestHarness plus corpus and topic helpers for tests
//! covering index construction, topic hierarchies and probes.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Once};

use ndarray::Array2;

use docscope_index::{DocumentIndex, TopicMetadata};
use docscope_llm::{InMemoryTemplates, MockEmbedder, MockGenerator, Prompt, ServiceContext};
use docscope_types::{DocId, KeywordSettings, LevelKey, ProbeSettings, Settings};

static TRACING: Once = Once::new();

/// Install a test-writer tracing subscriber once per process.
///
/// Honours `RUST_LOG`; defaults to `warn`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Shared test harness for E2E tests.
///
/// Owns a temp directory for persisted indexes, test settings, and mock
/// generation and embedding services.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Path for saved index files
    pub index_path: PathBuf,
    /// Settings tuned for small corpora
    pub settings: Settings,
    /// Mock services shared by topic labeling and probe training
    pub services: ServiceContext,
}

impl TestHarness {
    /// Embedding dimension of the mock embedder.
    pub const DIMENSION: usize = 32;

    /// Create a new harness with temp directory and mock services.
    pub fn new() -> Self {
        init_tracing();
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_path = temp_dir.path().join("index.json");

        let mut settings = Settings::default();
        settings.probes = ProbeSettings {
            num_samples: 3,
            cv_folds: 3,
            ..ProbeSettings::default()
        };

        settings.service.max_concurrency = 4;

        let services = ServiceContext::from_settings(
            Arc::new(scripted_generator()),
            Arc::new(MockEmbedder::new(Self::DIMENSION)),
            Arc::new(InMemoryTemplates::with_defaults()),
            &settings.service,
        );

        Self {
            _temp_dir: temp_dir,
            index_path,
            settings,
            services,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Generator that answers every default template in its expected format.
///
/// Labels and summaries echo the first keyword line; rewrites and synthetic
/// examples are derived from the prompt so identical prompts give identical
/// text.
pub fn scripted_generator() -> MockGenerator {
    MockGenerator::with_responder(|prompt: &Prompt| {
        let user = &prompt.user;
        let response = if user.contains("Name the topic") {
            "Topic Label: Mock topic".to_string()
        } else if user.contains("Summarize") {
            "Topic Summary: A topic about mock things.".to_string()
        } else if let Some((_, document)) = user.split_once("Document:\n") {
            let document = document.split("\n\n").next().unwrap_or_default();
            format!("Rewritten Document: formally, {document}")
        } else {
            let label = user.split('"').nth(1).unwrap_or("unknown");
            format!("Example: an example about {label}")
        };
        Ok(response)
    })
}

/// A small corpus of three clearly separated subjects, four documents each.
pub fn themed_corpus() -> Vec<String> {
    [
        "rust ownership borrowing lifetimes compiler",
        "rust borrow checker lifetimes references",
        "rust compiler ownership traits generics",
        "rust traits generics borrow checker",
        "sourdough bread starter flour baking",
        "baking bread with sourdough starter",
        "flour water salt bread dough baking",
        "sourdough dough proofing flour oven",
        "marathon running training pace miles",
        "running shoes marathon training plan",
        "interval training pace running track",
        "miles per week marathon running plan",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Index over `groups * per_group` documents with block embeddings.
///
/// Documents of group `g` (consecutive ids) point along axis `g` with a
/// small per-document offset, so any two groups are nearly orthogonal.
pub fn block_index(groups: usize, per_group: usize) -> DocumentIndex {
    let n = groups * per_group;
    let dimension = groups + 1;
    let documents = (0..n)
        .map(|i| format!("group {} document {}", i / per_group + 1, i + 1))
        .collect();
    let embeddings = Array2::from_shape_fn((dimension, n), |(r, c)| {
        if r == c / per_group {
            1.0
        } else if r == groups {
            0.05 * (c % per_group) as f32
        } else {
            0.0
        }
    });
    DocumentIndex::from_parts(documents, embeddings, &KeywordSettings::default())
        .expect("Failed to build block index")
}

/// Hand-built topic with the first member as centroid.
pub fn topic(level: &LevelKey, topic_index: usize, members: Vec<DocId>) -> TopicMetadata {
    TopicMetadata {
        level_key: level.clone(),
        topic_index,
        label: String::new(),
        summary: String::new(),
        centroid_id: members[0],
        member_ids: members,
        sample_ids: Vec::new(),
        keyword_ids: Vec::new(),
    }
}

/// Assert that every level of `index` partitions `1..=N` and that each
/// topic's centroid is a member but not a sample.
pub fn assert_topic_invariants(index: &DocumentIndex) {
    let all: BTreeSet<DocId> = (1..=index.len()).collect();
    for (key, topics) in index.topic_levels() {
        let mut seen = BTreeSet::new();
        for topic in topics {
            for &id in &topic.member_ids {
                assert!(seen.insert(id), "document {id} repeated in level {key}");
            }
            assert!(
                topic.contains(topic.centroid_id),
                "centroid of topic {} in level {key} is not a member",
                topic.topic_index
            );
            assert!(!topic.sample_ids.contains(&topic.centroid_id));
            assert!(topic.sample_ids.iter().all(|&id| topic.contains(id)));
        }
        assert_eq!(seen, all, "level {key} does not cover every document");
    }
}

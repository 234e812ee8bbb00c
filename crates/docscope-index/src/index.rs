//! The central document store.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use docscope_types::{DocId, DocscopeError, IndexId, KeywordSettings, LevelKey, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dendrogram::{ClusteringResult, Dendrogram};
use crate::keywords::{KeywordExtractor, KeywordTable, SparseTermMatrix};
use crate::similarity::{normalize_columns, pairwise_distances};
use crate::topic::TopicMetadata;

/// Documents, their embeddings and everything derived from them for one
/// analysis session.
///
/// Document ids are 1-based positions in [`documents`](Self::documents).
/// Embeddings are stored as a `D x N` matrix with unit-normalised columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIndex {
    id: IndexId,
    created_at: DateTime<Utc>,
    documents: Vec<String>,
    embeddings: Array2<f32>,
    distances: Array2<f32>,
    keywords: KeywordTable,
    clustering: Option<ClusteringResult>,
    #[serde(with = "level_pairs")]
    topic_levels: BTreeMap<LevelKey, Vec<TopicMetadata>>,
    projection: Option<Array2<f32>>,
}

impl DocumentIndex {
    /// Build an index from precomputed embeddings (`D x N`, one column per
    /// document). Columns are normalised, distances and keywords computed.
    pub fn from_parts(
        documents: Vec<String>,
        mut embeddings: Array2<f32>,
        keyword_settings: &KeywordSettings,
    ) -> Result<Self> {
        if documents.is_empty() {
            return Err(DocscopeError::invalid("document set is empty"));
        }
        if embeddings.ncols() != documents.len() {
            return Err(DocscopeError::DimensionMismatch {
                expected: documents.len(),
                actual: embeddings.ncols(),
            });
        }
        if embeddings.nrows() == 0 {
            return Err(DocscopeError::invalid("embeddings have zero dimensions"));
        }

        normalize_columns(&mut embeddings);
        let distances = pairwise_distances(embeddings.view());
        let keywords = KeywordExtractor::new(keyword_settings.clone()).extract(&documents);

        let index = Self {
            id: IndexId::new(),
            created_at: Utc::now(),
            documents,
            embeddings,
            distances,
            keywords,
            clustering: None,
            topic_levels: BTreeMap::new(),
            projection: None,
        };
        info!(
            index = %index.id,
            documents = index.len(),
            dimension = index.dimension(),
            terms = index.vocabulary().len(),
            "Built document index"
        );
        Ok(index)
    }

    /// Identity token of this index.
    pub fn id(&self) -> IndexId {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    /// Text of one document.
    pub fn document(&self, id: DocId) -> Result<&str> {
        self.check_id(id)?;
        Ok(&self.documents[id - 1])
    }

    /// Fail with `InvalidArgument` unless `id` is in `1..=len`.
    pub fn check_id(&self, id: DocId) -> Result<()> {
        if id == 0 || id > self.len() {
            return Err(DocscopeError::invalid(format!(
                "document id {id} is outside 1..={}",
                self.len()
            )));
        }
        Ok(())
    }

    /// Embedding dimension `D`.
    pub fn dimension(&self) -> usize {
        self.embeddings.nrows()
    }

    /// All embeddings, `D x N`.
    pub fn embeddings(&self) -> ArrayView2<'_, f32> {
        self.embeddings.view()
    }

    /// Embedding column of one document. Panics on an invalid id; use
    /// [`check_id`](Self::check_id) first for untrusted input.
    pub fn embedding(&self, id: DocId) -> ArrayView1<'_, f32> {
        self.embeddings.column(id - 1)
    }

    /// Pairwise cosine distances, `N x N`.
    pub fn distances(&self) -> ArrayView2<'_, f32> {
        self.distances.view()
    }

    /// Keyword weights, `terms x N`.
    pub fn keyword_weights(&self) -> &SparseTermMatrix {
        &self.keywords.weights
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.keywords.vocabulary
    }

    /// Display strings for a list of vocabulary indices.
    pub fn keyword_strings(&self, keyword_ids: &[usize]) -> Vec<&str> {
        keyword_ids
            .iter()
            .filter_map(|&k| self.keywords.vocabulary.get(k).map(String::as_str))
            .collect()
    }

    pub fn clustering(&self) -> Option<&ClusteringResult> {
        self.clustering.as_ref()
    }

    /// Cached dendrogram, if hierarchical clustering has run.
    pub fn dendrogram(&self) -> Option<&Dendrogram> {
        self.clustering.as_ref().and_then(ClusteringResult::dendrogram)
    }

    /// Store a clustering structure after checking it covers every document.
    pub fn set_clustering(&mut self, clustering: ClusteringResult) -> Result<()> {
        if let Some(dendrogram) = clustering.dendrogram() {
            if dendrogram.n_leaves() != self.len() {
                return Err(DocscopeError::DimensionMismatch {
                    expected: self.len(),
                    actual: dendrogram.n_leaves(),
                });
            }
        }
        self.clustering = Some(clustering);
        Ok(())
    }

    /// Discard the cached clustering so the next request rebuilds it.
    pub fn clear_clustering(&mut self) {
        self.clustering = None;
    }

    pub fn topic_levels(&self) -> &BTreeMap<LevelKey, Vec<TopicMetadata>> {
        &self.topic_levels
    }

    pub fn has_level(&self, key: &LevelKey) -> bool {
        self.topic_levels.contains_key(key)
    }

    /// Topics of one level, or `UnknownLevel`.
    pub fn topic_level(&self, key: &LevelKey) -> Result<&[TopicMetadata]> {
        self.topic_levels
            .get(key)
            .map(Vec::as_slice)
            .ok_or_else(|| DocscopeError::UnknownLevel(key.clone()))
    }

    /// Store (or overwrite) a level. The topics must partition `1..=N`, and
    /// each topic's centroid and samples must be among its members. Member
    /// and sample ids are sorted on the way in.
    pub fn set_topic_level(
        &mut self,
        key: LevelKey,
        mut topics: Vec<TopicMetadata>,
    ) -> Result<()> {
        for topic in topics.iter_mut() {
            topic.member_ids.sort_unstable();
            topic.sample_ids.sort_unstable();
        }
        self.check_partition(&key, &topics)?;
        if self.topic_levels.insert(key.clone(), topics).is_some() {
            debug!(level = %key, "Overwrote topic level");
        }
        Ok(())
    }

    /// Replace the label of one topic (manual edit).
    pub fn set_topic_label(
        &mut self,
        key: &LevelKey,
        topic_index: usize,
        label: impl Into<String>,
    ) -> Result<()> {
        let topics = self
            .topic_levels
            .get_mut(key)
            .ok_or_else(|| DocscopeError::UnknownLevel(key.clone()))?;
        let topic = topics
            .iter_mut()
            .find(|t| t.topic_index == topic_index)
            .ok_or_else(|| DocscopeError::InvalidTopicIndex {
                level: key.clone(),
                topic: topic_index,
            })?;
        topic.label = label.into();
        Ok(())
    }

    fn check_partition(&self, key: &LevelKey, topics: &[TopicMetadata]) -> Result<()> {
        let mut seen = vec![false; self.len()];
        for topic in topics {
            if topic.level_key != *key {
                return Err(DocscopeError::invalid(format!(
                    "topic {} belongs to level {}, not {key}",
                    topic.topic_index, topic.level_key
                )));
            }
            if topic.member_ids.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(DocscopeError::invalid(format!(
                    "members of topic {} in level {key} are not strictly ascending",
                    topic.topic_index
                )));
            }
            for &id in &topic.member_ids {
                self.check_id(id)?;
                if std::mem::replace(&mut seen[id - 1], true) {
                    return Err(DocscopeError::invalid(format!(
                        "document {id} appears in more than one topic of level {key}"
                    )));
                }
            }
            if !topic.contains(topic.centroid_id) {
                return Err(DocscopeError::invalid(format!(
                    "centroid {} of topic {} in level {key} is not a member",
                    topic.centroid_id, topic.topic_index
                )));
            }
            if let Some(&stray) = topic
                .sample_ids
                .iter()
                .find(|&&id| id == topic.centroid_id || !topic.contains(id))
            {
                return Err(DocscopeError::invalid(format!(
                    "sample {stray} of topic {} in level {key} is the centroid or not a member",
                    topic.topic_index
                )));
            }
        }
        if let Some(missing) = seen.iter().position(|s| !s) {
            return Err(DocscopeError::invalid(format!(
                "document {} is not assigned to any topic of level {key}",
                missing + 1
            )));
        }
        Ok(())
    }

    /// 2-D display coordinates, if a projection has been stored.
    pub fn projection(&self) -> Option<ArrayView2<'_, f32>> {
        self.projection.as_ref().map(Array2::view)
    }

    /// Store externally computed `2 x N` coordinates.
    pub fn set_projection(&mut self, coordinates: Array2<f32>) -> Result<()> {
        if coordinates.nrows() != 2 || coordinates.ncols() != self.len() {
            return Err(DocscopeError::invalid(format!(
                "projection must be 2 x {}, got {} x {}",
                self.len(),
                coordinates.nrows(),
                coordinates.ncols()
            )));
        }
        self.projection = Some(coordinates);
        Ok(())
    }

    /// Write the index as JSON.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_vec(self)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), index = %self.id, "Saved index");
        Ok(())
    }

    /// Read an index written by [`save_json`](Self::save_json) and check
    /// its shapes line up.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path.as_ref())?;
        let index: Self = serde_json::from_slice(&bytes)?;
        index.validate()?;
        Ok(index)
    }

    fn validate(&self) -> Result<()> {
        let n = self.len();
        if self.embeddings.ncols() != n {
            return Err(DocscopeError::DimensionMismatch {
                expected: n,
                actual: self.embeddings.ncols(),
            });
        }
        if self.distances.dim() != (n, n) {
            return Err(DocscopeError::invalid("distance matrix is not N x N"));
        }
        if self.keywords.weights.n_documents() != n {
            return Err(DocscopeError::invalid("keyword matrix does not cover every document"));
        }
        for (key, topics) in &self.topic_levels {
            self.check_partition(key, topics)?;
        }
        Ok(())
    }
}

/// Topic levels as an ordered list of `(key, topics)` pairs; JSON object
/// keys cannot hold a [`LevelKey`].
mod level_pairs {
    use std::collections::BTreeMap;

    use docscope_types::LevelKey;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::topic::TopicMetadata;

    type Levels = BTreeMap<LevelKey, Vec<TopicMetadata>>;

    pub fn serialize<S: Serializer>(levels: &Levels, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(levels.iter())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Levels, D::Error> {
        let pairs: Vec<(LevelKey, Vec<TopicMetadata>)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small_index() -> DocumentIndex {
        let documents = vec![
            "rust compilers and borrow checking".to_string(),
            "rust borrow checker errors".to_string(),
            "baking sourdough bread".to_string(),
        ];
        let embeddings = array![[1.0, 0.9, 0.0], [0.0, 0.1, 1.0]];
        DocumentIndex::from_parts(documents, embeddings, &KeywordSettings::default()).unwrap()
    }

    fn topic(key: &LevelKey, index: usize, members: Vec<DocId>) -> TopicMetadata {
        TopicMetadata {
            level_key: key.clone(),
            topic_index: index,
            label: String::new(),
            summary: String::new(),
            centroid_id: members[0],
            member_ids: members,
            sample_ids: vec![],
            keyword_ids: vec![],
        }
    }

    #[test]
    fn test_from_parts_shapes() {
        let index = small_index();
        assert_eq!(index.len(), 3);
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.distances().dim(), (3, 3));
        assert_eq!(index.keyword_weights().n_documents(), 3);
        assert!(index.dendrogram().is_none());
        let norm: f32 = index.embedding(2).iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_from_parts_rejects_bad_input() {
        let err =
            DocumentIndex::from_parts(vec![], Array2::zeros((2, 0)), &KeywordSettings::default());
        assert!(matches!(err, Err(DocscopeError::InvalidArgument(_))));

        let err = DocumentIndex::from_parts(
            vec!["a".into(), "b".into()],
            Array2::ones((2, 3)),
            &KeywordSettings::default(),
        );
        assert!(matches!(err, Err(DocscopeError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_document_lookup_is_one_based() {
        let index = small_index();
        assert_eq!(index.document(3).unwrap(), "baking sourdough bread");
        assert!(index.document(0).is_err());
        assert!(index.document(4).is_err());
    }

    #[test]
    fn test_set_topic_level_checks_partition() {
        let mut index = small_index();
        let key = LevelKey::Count(2);

        let overlapping = vec![topic(&key, 1, vec![1, 2]), topic(&key, 2, vec![2, 3])];
        assert!(index.set_topic_level(key.clone(), overlapping).is_err());

        let incomplete = vec![topic(&key, 1, vec![1, 2])];
        assert!(index.set_topic_level(key.clone(), incomplete).is_err());

        let valid = vec![topic(&key, 1, vec![1, 2]), topic(&key, 2, vec![3])];
        index.set_topic_level(key.clone(), valid).unwrap();
        assert_eq!(index.topic_level(&key).unwrap().len(), 2);
    }

    #[test]
    fn test_set_topic_level_sorts_members() {
        let mut index = small_index();
        let key = LevelKey::Count(2);
        let mut shuffled = topic(&key, 1, vec![3, 1]);
        shuffled.centroid_id = 1;
        index
            .set_topic_level(key.clone(), vec![shuffled, topic(&key, 2, vec![2])])
            .unwrap();

        let stored = &index.topic_level(&key).unwrap()[0];
        assert_eq!(stored.member_ids, vec![1, 3]);
        assert!(stored.contains(3));
        assert!(stored.contains(1));
        assert!(!stored.contains(2));
    }

    #[test]
    fn test_set_topic_level_checks_representatives() {
        let mut index = small_index();
        let key = LevelKey::Count(2);

        let mut foreign_centroid = topic(&key, 1, vec![1, 2]);
        foreign_centroid.centroid_id = 3;
        let level = vec![foreign_centroid, topic(&key, 2, vec![3])];
        assert!(matches!(
            index.set_topic_level(key.clone(), level),
            Err(DocscopeError::InvalidArgument(_))
        ));

        let mut foreign_sample = topic(&key, 1, vec![1, 2]);
        foreign_sample.sample_ids = vec![3];
        let level = vec![foreign_sample, topic(&key, 2, vec![3])];
        assert!(index.set_topic_level(key.clone(), level).is_err());

        let mut centroid_sample = topic(&key, 1, vec![1, 2]);
        centroid_sample.sample_ids = vec![1];
        let level = vec![centroid_sample, topic(&key, 2, vec![3])];
        assert!(index.set_topic_level(key.clone(), level).is_err());

        let empty = vec![topic(&key, 1, vec![1, 2, 3]), {
            let mut t = topic(&key, 2, vec![1]);
            t.member_ids.clear();
            t
        }];
        assert!(index.set_topic_level(key.clone(), empty).is_err());
        assert!(!index.has_level(&key));

        let mut valid = topic(&key, 1, vec![1, 2]);
        valid.sample_ids = vec![2];
        index
            .set_topic_level(key.clone(), vec![valid, topic(&key, 2, vec![3])])
            .unwrap();
    }

    #[test]
    fn test_loaded_levels_need_ascending_members() {
        let index = small_index();
        let key = LevelKey::Count(2);
        let mut unsorted = topic(&key, 1, vec![2, 1]);
        unsorted.centroid_id = 2;
        let level = vec![unsorted, topic(&key, 2, vec![3])];
        assert!(index.check_partition(&key, &level).is_err());
    }

    #[test]
    fn test_unknown_level() {
        let index = small_index();
        let err = index.topic_level(&LevelKey::from("missing")).unwrap_err();
        assert!(matches!(err, DocscopeError::UnknownLevel(_)));
    }

    #[test]
    fn test_set_topic_label() {
        let mut index = small_index();
        let key = LevelKey::Count(1);
        index
            .set_topic_level(key.clone(), vec![topic(&key, 1, vec![1, 2, 3])])
            .unwrap();
        index.set_topic_label(&key, 1, "Everything").unwrap();
        assert_eq!(index.topic_level(&key).unwrap()[0].label, "Everything");
        assert!(index.set_topic_label(&key, 7, "x").is_err());
    }

    #[test]
    fn test_set_projection_shape() {
        let mut index = small_index();
        assert!(index.set_projection(Array2::zeros((3, 3))).is_err());
        index.set_projection(Array2::zeros((2, 3))).unwrap();
        assert_eq!(index.projection().unwrap().dim(), (2, 3));
    }

    #[test]
    fn test_json_round_trip() {
        let mut index = small_index();
        let key = LevelKey::from("manual");
        index
            .set_topic_level(
                key.clone(),
                vec![topic(&key, 1, vec![1, 2]), topic(&key, 2, vec![3])],
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.json");
        index.save_json(&path).unwrap();
        let loaded = DocumentIndex::load_json(&path).unwrap();

        assert_eq!(loaded.id(), index.id());
        assert_eq!(loaded.documents(), index.documents());
        assert_eq!(loaded.topic_levels(), index.topic_levels());
        assert_eq!(loaded.vocabulary(), index.vocabulary());
        assert_eq!(loaded.embeddings().dim(), index.embeddings().dim());
    }
}

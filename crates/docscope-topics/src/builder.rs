//! Construction of one topic's metadata from a partition assignment.

use docscope_index::{cosine_distance, mean_column, DocumentIndex, TopicMetadata};
use docscope_llm::CostTracker;
use docscope_types::{DocId, DocscopeError, LevelKey, Result};
use ndarray::Axis;
use tracing::debug;

use crate::kmedoids::kmedoids;
use crate::labeling::{TopicContext, TopicLabeler};

/// Builds [`TopicMetadata`] for single topics of a level.
#[derive(Debug, Clone)]
pub struct TopicBuilder<'a> {
    index: &'a DocumentIndex,
    num_samples: usize,
    num_keywords: usize,
    labeler: Option<TopicLabeler>,
}

impl<'a> TopicBuilder<'a> {
    pub fn new(index: &'a DocumentIndex, num_samples: usize, num_keywords: usize) -> Self {
        Self {
            index,
            num_samples,
            num_keywords,
            labeler: None,
        }
    }

    /// Generate labels and/or summaries with this labeler.
    pub fn with_labeler(mut self, labeler: TopicLabeler) -> Self {
        self.labeler = Some(labeler);
        self
    }

    /// Build the topic numbered `topic_index` in a 1-based `assignment`
    /// (one entry per document).
    pub async fn build(
        &self,
        assignment: &[usize],
        topic_index: usize,
        level_key: &LevelKey,
        cost: &CostTracker,
    ) -> Result<TopicMetadata> {
        if assignment.len() != self.index.len() {
            return Err(DocscopeError::DimensionMismatch {
                expected: self.index.len(),
                actual: assignment.len(),
            });
        }

        let member_ids: Vec<DocId> = assignment
            .iter()
            .enumerate()
            .filter(|&(_, &topic)| topic == topic_index)
            .map(|(pos, _)| pos + 1)
            .collect();
        if member_ids.is_empty() {
            return Err(DocscopeError::InvalidTopicIndex {
                level: level_key.clone(),
                topic: topic_index,
            });
        }

        let keyword_ids = self.rank_keywords(&member_ids);
        let centroid_id = self.centroid(&member_ids);
        let sample_ids = self.diverse_samples(&member_ids, centroid_id);

        let (label, summary) = match &self.labeler {
            Some(labeler) => {
                let context = TopicContext {
                    central_text: self.index.document(centroid_id)?,
                    samples: sample_ids
                        .iter()
                        .map(|&id| self.index.document(id))
                        .collect::<Result<_>>()?,
                    keywords: self.index.keyword_strings(&keyword_ids),
                };
                labeler.describe(&context, cost).await?
            }
            None => (String::new(), String::new()),
        };

        debug!(
            level = %level_key,
            topic = topic_index,
            members = member_ids.len(),
            centroid = centroid_id,
            samples = sample_ids.len(),
            "Built topic"
        );

        Ok(TopicMetadata {
            level_key: level_key.clone(),
            topic_index,
            label,
            summary,
            member_ids,
            centroid_id,
            sample_ids,
            keyword_ids,
        })
    }

    /// Top vocabulary indices by summed weight over the members; ties keep
    /// vocabulary order.
    fn rank_keywords(&self, member_ids: &[DocId]) -> Vec<usize> {
        let weights = self.index.keyword_weights();
        if self.num_keywords == 0 || weights.is_empty() {
            return Vec::new();
        }
        let columns: Vec<usize> = member_ids.iter().map(|id| id - 1).collect();
        let totals = weights.sum_columns(&columns);

        let mut ranked: Vec<usize> = (0..totals.len()).filter(|&t| totals[t] > 0.0).collect();
        ranked.sort_by(|&a, &b| totals[b].total_cmp(&totals[a]));
        ranked.truncate(self.num_keywords);
        ranked
    }

    /// Member nearest (by cosine distance) to the mean member embedding.
    fn centroid(&self, member_ids: &[DocId]) -> DocId {
        let columns: Vec<usize> = member_ids.iter().map(|id| id - 1).collect();
        let mean = mean_column(self.index.embeddings(), &columns);

        let mut best = (member_ids[0], f32::INFINITY);
        for &id in member_ids {
            let distance = cosine_distance(mean.view(), self.index.embedding(id));
            if distance < best.1 {
                best = (id, distance);
            }
        }
        best.0
    }

    /// Medoids of the members' distance submatrix, minus the centroid.
    fn diverse_samples(&self, member_ids: &[DocId], centroid_id: DocId) -> Vec<DocId> {
        if self.num_samples == 0 {
            return Vec::new();
        }
        let rows: Vec<usize> = member_ids.iter().map(|id| id - 1).collect();
        let submatrix = self
            .index
            .distances()
            .select(Axis(0), &rows)
            .select(Axis(1), &rows);
        let k = self.num_samples.min(member_ids.len());

        kmedoids(submatrix.view(), k)
            .into_iter()
            .map(|row| member_ids[row])
            .filter(|&id| id != centroid_id)
            .collect()
    }
}

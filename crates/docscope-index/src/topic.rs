//! Topic metadata stored per level in a [`DocumentIndex`](crate::DocumentIndex).

use docscope_types::{DocId, LevelKey};
use serde::{Deserialize, Serialize};

/// Descriptive metadata for one topic of one level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicMetadata {
    /// Level this topic belongs to
    pub level_key: LevelKey,
    /// 1-based position within its level
    pub topic_index: usize,
    /// Short generated label, empty until generated or edited
    pub label: String,
    /// Generated summary, empty until generated
    pub summary: String,
    /// Documents in this topic, ascending
    pub member_ids: Vec<DocId>,
    /// Member closest to the topic's mean embedding
    pub centroid_id: DocId,
    /// Diverse representative members, never containing the centroid
    pub sample_ids: Vec<DocId>,
    /// Vocabulary indices ranked by aggregate weight in the topic
    pub keyword_ids: Vec<usize>,
}

impl TopicMetadata {
    /// Number of member documents.
    pub fn size(&self) -> usize {
        self.member_ids.len()
    }

    /// Check whether a document belongs to this topic.
    pub fn contains(&self, id: DocId) -> bool {
        self.member_ids.binary_search(&id).is_ok()
    }

    /// Label for display, falling back to the topic index.
    pub fn display_label(&self) -> String {
        if self.label.trim().is_empty() {
            format!("Topic {}", self.topic_index)
        } else {
            self.label.clone()
        }
    }
}

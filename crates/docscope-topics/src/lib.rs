//! # docscope-topics
//!
//! Topic hierarchy construction over a [`docscope_index::DocumentIndex`].
//!
//! ## Features
//! - Complete-linkage hierarchical clustering, cached on the index
//! - Per-topic metadata: centroid document, k-medoids diverse samples,
//!   ranked keywords, optional generated label and summary
//! - Automatic levels from dendrogram cuts and custom levels from external
//!   assignments
//! - Cross-level topic trees linked by centroid membership

pub mod builder;
pub mod clusterer;
pub mod kmedoids;
pub mod labeling;
pub mod manager;
pub mod tree;

pub use builder::TopicBuilder;
pub use clusterer::{topic_count, Cut, HierarchicalClusterer};
pub use kmedoids::kmedoids;
pub use labeling::{TopicContext, TopicLabeler};
pub use manager::TopicHierarchyManager;
pub use tree::{TopicTreeBuilder, TopicTreeNode, TreeIter};

//! # docscope-index
//!
//! The document index every other docscope component reads and mutates.
//!
//! ## Contents
//! - [`DocumentIndex`]: documents, normalised embeddings, cosine distances,
//!   keyword weights, the cached clustering and named topic levels
//! - [`KeywordExtractor`]: Unicode tokenisation, stemming and TF-IDF weights
//! - [`Dendrogram`]: agglomerative merge tree with flat cuts
//! - [`build_index`]: embed raw text and assemble an index

pub mod builder;
pub mod dendrogram;
pub mod index;
pub mod keywords;
pub mod similarity;
pub mod topic;

pub use builder::build_index;
pub use dendrogram::{ClusteringResult, Dendrogram, Merge};
pub use index::DocumentIndex;
pub use keywords::{KeywordExtractor, KeywordTable, SparseTermMatrix};
pub use similarity::{cosine_distance, cosine_similarity, mean_column, pairwise_distances};
pub use topic::TopicMetadata;

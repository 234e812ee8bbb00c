//! Complete-linkage hierarchical clustering over an index's distances.

use docscope_index::{ClusteringResult, Dendrogram, DocumentIndex, Merge};
use docscope_types::{DocscopeError, Result};
use kodama::{linkage, Method};
use ndarray::ArrayView2;
use tracing::{debug, info, instrument};

/// Where to cut the dendrogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Cut {
    /// Exactly this many topics
    Topics(usize),
    /// Apply every merge at or below this height
    Height(f32),
}

/// Builds the dendrogram once per index and cuts it into flat partitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchicalClusterer;

impl HierarchicalClusterer {
    pub fn new() -> Self {
        Self
    }

    /// Run complete-linkage clustering over a square distance matrix.
    pub fn build(&self, distances: ArrayView2<f32>) -> Result<Dendrogram> {
        let n = distances.nrows();
        if n == 0 {
            return Err(DocscopeError::invalid("cannot cluster an empty document set"));
        }
        if distances.ncols() != n {
            return Err(DocscopeError::DimensionMismatch {
                expected: n,
                actual: distances.ncols(),
            });
        }
        if n == 1 {
            return Dendrogram::new(1, Vec::new());
        }

        // Condensed upper triangle, row-major, N choose 2 entries
        let mut condensed = Vec::with_capacity(n * (n - 1) / 2);
        for row in 0..n - 1 {
            for col in row + 1..n {
                condensed.push(distances[[row, col]]);
            }
        }

        // kodama numbers leaves 0..n and gives merge i the id n + i
        let steps = linkage(&mut condensed, n, Method::Complete);
        let merges = steps
            .steps()
            .iter()
            .map(|step| Merge {
                left: step.cluster1,
                right: step.cluster2,
                height: step.dissimilarity,
                size: step.size,
            })
            .collect();

        Dendrogram::new(n, merges)
    }

    /// Dendrogram cached on the index, built on first use.
    #[instrument(skip_all, fields(documents = index.len()))]
    pub fn ensure<'a>(&self, index: &'a mut DocumentIndex) -> Result<&'a Dendrogram> {
        if index.dendrogram().is_none() {
            let dendrogram = self.build(index.distances())?;
            info!(merges = dendrogram.merges().len(), "Built dendrogram");
            index.set_clustering(ClusteringResult::Hierarchical(dendrogram))?;
        }
        index
            .dendrogram()
            .ok_or_else(|| DocscopeError::invalid("index holds a non-hierarchical clustering"))
    }

    /// Build the dendrogram on the blocking pool and cache it on the index,
    /// unless one is already cached.
    #[instrument(skip_all, fields(documents = index.len()))]
    pub async fn ensure_offloaded(&self, index: &mut DocumentIndex) -> Result<()> {
        if index.dendrogram().is_some() {
            return Ok(());
        }
        let distances = index.distances().to_owned();
        let clusterer = *self;
        let dendrogram = tokio::task::spawn_blocking(move || clusterer.build(distances.view()))
            .await
            .map_err(|e| DocscopeError::Service(format!("clustering task failed: {e}")))??;
        info!(merges = dendrogram.merges().len(), "Built dendrogram");
        index.set_clustering(ClusteringResult::Hierarchical(dendrogram))
    }

    /// Cut the index's dendrogram, building it first if needed.
    ///
    /// Returns one 1-based topic per document. Topic counts outside
    /// `1..N` are rejected before any clustering work.
    pub fn cut(&self, index: &mut DocumentIndex, cut: Cut) -> Result<Vec<usize>> {
        validate_cut(index.len(), cut)?;
        let dendrogram = self.ensure(index)?;
        let assignment = match cut {
            Cut::Topics(k) => dendrogram.cut_to_k(k)?,
            Cut::Height(h) => dendrogram.cut_at_height(h),
        };
        debug!(?cut, topics = topic_count(&assignment), "Cut dendrogram");
        Ok(assignment)
    }
}

pub(crate) fn validate_cut(n: usize, cut: Cut) -> Result<()> {
    if n == 0 {
        return Err(DocscopeError::invalid("cannot cluster an empty document set"));
    }
    match cut {
        Cut::Topics(0) => Err(DocscopeError::invalid("number of topics must be at least 1")),
        Cut::Topics(k) if k >= n => Err(DocscopeError::invalid(format!(
            "number of topics ({k}) must be below the number of documents ({n})"
        ))),
        Cut::Height(h) if !h.is_finite() || h < 0.0 => Err(DocscopeError::invalid(format!(
            "cut height must be a non-negative number, got {h}"
        ))),
        _ => Ok(()),
    }
}

/// Number of distinct topics in a 1-based assignment.
pub fn topic_count(assignment: &[usize]) -> usize {
    assignment.iter().copied().max().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docscope_types::KeywordSettings;
    use ndarray::Array2;

    /// Three tight pairs along separate axes.
    fn paired_index() -> DocumentIndex {
        let mut embeddings = Array2::<f32>::zeros((3, 6));
        for (col, (axis, jitter)) in [(0, 0.0), (0, 0.1), (1, 0.0), (1, 0.1), (2, 0.0), (2, 0.1)]
            .into_iter()
            .enumerate()
        {
            embeddings[[axis, col]] = 1.0;
            embeddings[[(axis + 1) % 3, col]] = jitter;
        }
        let documents = (1..=6).map(|i| format!("document {i}")).collect();
        DocumentIndex::from_parts(documents, embeddings, &KeywordSettings::default()).unwrap()
    }

    #[test]
    fn test_cut_recovers_pairs() {
        let mut index = paired_index();
        let assignment = HierarchicalClusterer::new()
            .cut(&mut index, Cut::Topics(3))
            .unwrap();
        assert_eq!(assignment, vec![1, 1, 2, 2, 3, 3]);
    }

    #[test]
    fn test_dendrogram_is_cached() {
        let mut index = paired_index();
        let clusterer = HierarchicalClusterer::new();
        assert!(index.dendrogram().is_none());
        let first = clusterer.cut(&mut index, Cut::Topics(2)).unwrap();
        assert!(index.dendrogram().is_some());
        let second = clusterer.cut(&mut index, Cut::Topics(2)).unwrap();
        assert_eq!(first, second);

        index.clear_clustering();
        assert!(index.dendrogram().is_none());
    }

    #[tokio::test]
    async fn test_offloaded_build_matches_inline_build() {
        let mut offloaded = paired_index();
        let clusterer = HierarchicalClusterer::new();
        clusterer.ensure_offloaded(&mut offloaded).await.unwrap();
        let cached = offloaded.dendrogram().cloned().unwrap();

        let mut inline = paired_index();
        assert_eq!(clusterer.ensure(&mut inline).unwrap(), &cached);

        // already cached: left as is
        clusterer.ensure_offloaded(&mut offloaded).await.unwrap();
        assert_eq!(offloaded.dendrogram(), Some(&cached));
    }

    #[test]
    fn test_cut_at_height() {
        let mut index = paired_index();
        let clusterer = HierarchicalClusterer::new();
        let all_separate = clusterer.cut(&mut index, Cut::Height(0.0)).unwrap();
        assert_eq!(topic_count(&all_separate), 6);
        let pairs = clusterer.cut(&mut index, Cut::Height(0.1)).unwrap();
        assert_eq!(topic_count(&pairs), 3);
        let one = clusterer.cut(&mut index, Cut::Height(2.0)).unwrap();
        assert_eq!(one, vec![1; 6]);
    }

    #[test]
    fn test_rejects_bad_cuts() {
        let mut index = paired_index();
        let clusterer = HierarchicalClusterer::new();
        assert!(clusterer.cut(&mut index, Cut::Topics(0)).is_err());
        assert!(clusterer.cut(&mut index, Cut::Topics(6)).is_err());
        assert!(clusterer.cut(&mut index, Cut::Height(-1.0)).is_err());
        // rejected before the dendrogram is built
        assert!(index.dendrogram().is_none());
    }

    #[test]
    fn test_build_rejects_empty() {
        let distances = Array2::<f32>::zeros((0, 0));
        assert!(HierarchicalClusterer::new().build(distances.view()).is_err());
    }
}

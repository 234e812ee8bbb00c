//! Agglomerative merge tree and flat cuts.

use docscope_types::{DocscopeError, Result};
use serde::{Deserialize, Serialize};

/// One agglomeration step.
///
/// Leaves are numbered `0..n_leaves`; the cluster created by step `i`
/// receives id `n_leaves + i`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    /// Linkage dissimilarity at which the two clusters merged
    pub height: f32,
    /// Number of leaves in the new cluster
    pub size: usize,
}

/// Merge tree over `n_leaves` documents, steps in non-decreasing height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dendrogram {
    n_leaves: usize,
    merges: Vec<Merge>,
}

impl Dendrogram {
    /// Validate and wrap a list of merge steps.
    pub fn new(n_leaves: usize, merges: Vec<Merge>) -> Result<Self> {
        if n_leaves == 0 {
            return Err(DocscopeError::invalid("dendrogram needs at least one leaf"));
        }
        if merges.len() != n_leaves - 1 {
            return Err(DocscopeError::invalid(format!(
                "expected {} merges for {} leaves, got {}",
                n_leaves - 1,
                n_leaves,
                merges.len()
            )));
        }
        for (step, merge) in merges.iter().enumerate() {
            let limit = n_leaves + step;
            if merge.left >= limit || merge.right >= limit || merge.left == merge.right {
                return Err(DocscopeError::invalid(format!(
                    "merge {step} references unknown cluster ({}, {})",
                    merge.left, merge.right
                )));
            }
        }
        Ok(Self { n_leaves, merges })
    }

    pub fn n_leaves(&self) -> usize {
        self.n_leaves
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Cut into exactly `k` clusters. Returns one 1-based label per leaf.
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<usize>> {
        if k == 0 || k > self.n_leaves {
            return Err(DocscopeError::invalid(format!(
                "cannot cut {} documents into {k} topics",
                self.n_leaves
            )));
        }
        Ok(self.labels_after(self.n_leaves - k))
    }

    /// Cut at a merge height: every merge at or below `height` is applied.
    pub fn cut_at_height(&self, height: f32) -> Vec<usize> {
        let steps = self
            .merges
            .iter()
            .take_while(|m| m.height <= height)
            .count();
        self.labels_after(steps)
    }

    /// Labels after applying the first `steps` merges, numbered by first
    /// appearance in leaf order.
    fn labels_after(&self, steps: usize) -> Vec<usize> {
        let mut parent: Vec<usize> = (0..self.n_leaves).collect();
        // representative leaf for every cluster id created so far
        let mut representative: Vec<usize> = (0..self.n_leaves).collect();

        fn find(parent: &mut [usize], mut x: usize) -> usize {
            while parent[x] != x {
                parent[x] = parent[parent[x]];
                x = parent[x];
            }
            x
        }

        for merge in &self.merges[..steps] {
            let a = find(&mut parent, representative[merge.left]);
            let b = find(&mut parent, representative[merge.right]);
            parent[b] = a;
            representative.push(a);
        }

        let mut label_of_root = vec![0usize; self.n_leaves];
        let mut next = 0;
        (0..self.n_leaves)
            .map(|leaf| {
                let root = find(&mut parent, leaf);
                if label_of_root[root] == 0 {
                    next += 1;
                    label_of_root[root] = next;
                }
                label_of_root[root]
            })
            .collect()
    }
}

/// Clustering structure cached on an index, one variant per algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ClusteringResult {
    /// Agglomerative clustering
    Hierarchical(Dendrogram),
}

impl ClusteringResult {
    pub fn dendrogram(&self) -> Option<&Dendrogram> {
        match self {
            ClusteringResult::Hierarchical(d) => Some(d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge(left: usize, right: usize, height: f32, size: usize) -> Merge {
        Merge {
            left,
            right,
            height,
            size,
        }
    }

    /// Leaves {0,1} merge at 0.1, {2,3} at 0.2, then everything at 0.9, then leaf 4.
    fn sample() -> Dendrogram {
        Dendrogram::new(
            5,
            vec![
                merge(0, 1, 0.1, 2),
                merge(2, 3, 0.2, 2),
                merge(5, 6, 0.9, 4),
                merge(4, 7, 1.5, 5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_cut_to_k() {
        let d = sample();
        assert_eq!(d.cut_to_k(5).unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(d.cut_to_k(3).unwrap(), vec![1, 1, 2, 2, 3]);
        assert_eq!(d.cut_to_k(2).unwrap(), vec![1, 1, 1, 1, 2]);
        assert_eq!(d.cut_to_k(1).unwrap(), vec![1; 5]);
    }

    #[test]
    fn test_cut_is_deterministic() {
        let d = sample();
        assert_eq!(d.cut_to_k(3).unwrap(), d.cut_to_k(3).unwrap());
    }

    #[test]
    fn test_cut_to_k_rejects_out_of_range() {
        let d = sample();
        assert!(d.cut_to_k(0).is_err());
        assert!(d.cut_to_k(6).is_err());
    }

    #[test]
    fn test_cut_at_height() {
        let d = sample();
        assert_eq!(d.cut_at_height(0.0), vec![1, 2, 3, 4, 5]);
        assert_eq!(d.cut_at_height(0.2), vec![1, 1, 2, 2, 3]);
        assert_eq!(d.cut_at_height(1.0), vec![1, 1, 1, 1, 2]);
        assert_eq!(d.cut_at_height(10.0), vec![1; 5]);
    }

    #[test]
    fn test_new_validates_merges() {
        assert!(Dendrogram::new(0, vec![]).is_err());
        assert!(Dendrogram::new(2, vec![]).is_err());
        let bad = vec![merge(0, 2, 0.1, 2)];
        assert!(Dendrogram::new(2, bad).is_err());
        assert!(Dendrogram::new(1, vec![]).is_ok());
    }

    #[test]
    fn test_clustering_result_serde() {
        let result = ClusteringResult::Hierarchical(sample());
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"method\":\"hierarchical\""));
        let back: ClusteringResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
    }
}

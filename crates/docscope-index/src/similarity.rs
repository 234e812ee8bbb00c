//! Vector similarity functions over embedding columns.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Calculate cosine similarity between two vectors.
///
/// Returns value in [-1.0, 1.0] where 1.0 = identical direction. Zero
/// vectors have similarity 0.
pub fn cosine_similarity(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    a.dot(&b) / (norm_a * norm_b)
}

/// Cosine distance, `1 - cosine_similarity`, clamped to [0, 2].
pub fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    (1.0 - cosine_similarity(a, b)).clamp(0.0, 2.0)
}

/// Mean of the selected columns (0-based) of a `D x N` matrix.
///
/// Not normalised: cosine distance to the mean does not depend on its length.
pub fn mean_column(embeddings: ArrayView2<f32>, columns: &[usize]) -> Array1<f32> {
    let mut mean = Array1::<f32>::zeros(embeddings.nrows());
    if columns.is_empty() {
        return mean;
    }
    for &col in columns {
        mean += &embeddings.column(col);
    }
    mean / columns.len() as f32
}

/// Normalize every column to unit length in place. Zero columns are left as-is.
pub fn normalize_columns(embeddings: &mut Array2<f32>) {
    for mut column in embeddings.axis_iter_mut(Axis(1)) {
        let norm = column.dot(&column).sqrt();
        if norm > 0.0 {
            column.mapv_inplace(|v| v / norm);
        }
    }
}

/// Pairwise cosine distances between the columns of a `D x N` matrix.
///
/// Returns a symmetric `N x N` matrix with a zero diagonal. Rows are computed
/// in parallel.
pub fn pairwise_distances(embeddings: ArrayView2<f32>) -> Array2<f32> {
    let n = embeddings.ncols();
    let norms: Vec<f32> = embeddings
        .axis_iter(Axis(1))
        .map(|c| c.dot(&c).sqrt())
        .collect();

    let rows: Vec<Vec<f32>> = (0..n)
        .into_par_iter()
        .map(|i| {
            let a = embeddings.column(i);
            (0..n)
                .map(|j| {
                    if i == j {
                        return 0.0;
                    }
                    let denom = norms[i] * norms[j];
                    let sim = if denom == 0.0 {
                        0.0
                    } else {
                        a.dot(&embeddings.column(j)) / denom
                    };
                    (1.0 - sim).clamp(0.0, 2.0)
                })
                .collect()
        })
        .collect();

    let mut distances = Array2::<f32>::zeros((n, n));
    for (i, row) in rows.into_iter().enumerate() {
        for (j, d) in row.into_iter().enumerate() {
            distances[[i, j]] = d;
        }
    }
    // Force exact symmetry
    for i in 0..n {
        for j in (i + 1)..n {
            let d = distances[[i, j]];
            distances[[j, i]] = d;
        }
    }
    distances
}

//! K-fold cross-validated accuracy for the logistic models.

use std::sync::Mutex;

use docscope_types::{DocscopeError, Result};
use ndarray::{ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::logistic::{Coefficients, Targets};

/// Shuffle `0..n` and split it into `k` contiguous folds whose sizes differ
/// by at most one.
pub fn create_folds<R: Rng + ?Sized>(k: usize, n: usize, rng: &mut R) -> Result<Vec<Vec<usize>>> {
    if k < 1 {
        return Err(DocscopeError::invalid("number of folds must be at least 1"));
    }
    if n < k {
        return Err(DocscopeError::invalid(format!(
            "cannot split {n} observations into {k} folds"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);

    let base = n / k;
    let extra = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = base + usize::from(fold < extra);
        folds.push(order[start..start + size].to_vec());
        start += size;
    }
    Ok(folds)
}

/// Estimates how well a logistic model separates its training data.
#[derive(Debug, Clone, Copy)]
pub struct CrossValidator {
    folds: usize,
    lambda: f64,
    max_iterations: usize,
}

impl CrossValidator {
    pub fn new(folds: usize, lambda: f64, max_iterations: usize) -> Self {
        Self {
            folds,
            lambda,
            max_iterations,
        }
    }

    /// Mean held-out accuracy over the folds.
    ///
    /// Folds are fitted in parallel and each writes its own slot of a shared
    /// results array. With a single fold the model is scored on the data it
    /// was fitted on.
    pub fn accuracy<R: Rng + ?Sized>(
        &self,
        x: ArrayView2<f64>,
        targets: &Targets,
        rng: &mut R,
    ) -> Result<f64> {
        let n = targets.len();
        if x.ncols() != n {
            return Err(DocscopeError::DimensionMismatch {
                expected: n,
                actual: x.ncols(),
            });
        }
        let folds = create_folds(self.folds, n, rng)?;
        let results = Mutex::new(vec![0.0f64; folds.len()]);

        folds.par_iter().enumerate().for_each(|(i, held_out)| {
            let train: Vec<usize> = if folds.len() == 1 {
                held_out.clone()
            } else {
                (0..n).filter(|row| !held_out.contains(row)).collect()
            };
            let model = Coefficients::fit(
                x.select(Axis(1), &train).view(),
                &targets.subset(&train),
                self.lambda,
                self.max_iterations,
            );
            let accuracy =
                model.accuracy(x.select(Axis(1), held_out).view(), &targets.subset(held_out));
            results.lock().expect("fold results mutex poisoned")[i] = accuracy;
        });

        let results = results.into_inner().expect("fold results mutex poisoned");
        let mean = results.iter().sum::<f64>() / results.len() as f64;
        debug!(folds = results.len(), accuracy = mean, "Cross-validated");
        Ok(mean)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_create_folds_partition() {
        let mut rng = StdRng::seed_from_u64(7);
        let folds = create_folds(3, 10, &mut rng).unwrap();
        assert_eq!(folds.len(), 3);
        assert!(folds.iter().all(|f| !f.is_empty()));
        let mut all: Vec<usize> = folds.concat();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        let sizes: Vec<usize> = folds.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
    }

    #[test]
    fn test_create_folds_rejects() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(create_folds(0, 5, &mut rng).is_err());
        assert!(create_folds(6, 5, &mut rng).is_err());
        assert_eq!(create_folds(5, 5, &mut rng).unwrap().len(), 5);
    }

    #[test]
    fn test_create_folds_reproducible() {
        let a = create_folds(4, 20, &mut StdRng::seed_from_u64(1)).unwrap();
        let b = create_folds(4, 20, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(a, b);
    }

    fn separable(n_per_class: usize) -> (Array2<f64>, Targets) {
        let n = 2 * n_per_class;
        let x = Array2::from_shape_fn((2, n), |(row, col)| {
            let sign = if col < n_per_class { 1.0 } else { -1.0 };
            if row == 0 {
                sign
            } else {
                (col as f64 * 0.37).sin() * 0.3
            }
        });
        let labels = (0..n)
            .map(|col| if col < n_per_class { 1.0 } else { -1.0 })
            .collect();
        (x, Targets::Binary(labels))
    }

    #[test]
    fn test_separable_data_scores_high() {
        let (x, targets) = separable(10);
        let accuracy = CrossValidator::new(4, 1e-3, 200)
            .accuracy(x.view(), &targets, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!(accuracy > 0.95);
    }

    #[test]
    fn test_random_labels_score_lower() {
        let (x, _) = separable(10);
        let labels = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let accuracy = CrossValidator::new(4, 1e-3, 200)
            .accuracy(x.view(), &Targets::Binary(labels), &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!(accuracy < 0.9);
    }

    #[test]
    fn test_single_fold_resubstitution() {
        let (x, targets) = separable(3);
        let accuracy = CrossValidator::new(1, 1e-3, 200)
            .accuracy(x.view(), &targets, &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(accuracy, 1.0);
    }

    #[test]
    fn test_dimension_mismatch() {
        let (x, _) = separable(3);
        let err = CrossValidator::new(2, 1e-3, 50)
            .accuracy(x.view(), &Targets::Binary(vec![1.0; 4]), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, DocscopeError::DimensionMismatch { .. }));
    }
}

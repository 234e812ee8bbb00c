//! L2-regularised logistic models without intercept.
//!
//! Observations are matrix columns (`D x M`), matching the embedding
//! layout of the index. Both models minimise
//! `sum(loss_i) + lambda / 2 * ||w||^2` with L-BFGS.

use std::collections::VecDeque;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

const HISTORY: usize = 10;
const GRADIENT_TOLERANCE: f64 = 1e-8;
const ARMIJO: f64 = 1e-4;
const MAX_LINE_SEARCH: usize = 40;

/// Logistic function, numerically stable for large `|x|`.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Softmax of one score vector.
pub fn softmax(scores: ArrayView1<f64>) -> Array1<f64> {
    let max = scores.fold(f64::NEG_INFINITY, |m, &s| m.max(s));
    let exp = scores.mapv(|s| (s - max).exp());
    let total = exp.sum();
    exp / total
}

/// `ln(1 + exp(x))` without overflow.
fn softplus(x: f64) -> f64 {
    if x > 0.0 {
        x + (-x).exp().ln_1p()
    } else {
        x.exp().ln_1p()
    }
}

/// Training targets for one model family.
#[derive(Debug, Clone, PartialEq)]
pub enum Targets {
    /// One `-1.0` / `+1.0` label per observation
    Binary(Vec<f64>),
    /// One 0-based class per observation
    Multiclass {
        classes: Vec<usize>,
        n_classes: usize,
    },
}

impl Targets {
    pub fn len(&self) -> usize {
        match self {
            Targets::Binary(labels) => labels.len(),
            Targets::Multiclass { classes, .. } => classes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Targets restricted to the given observations.
    pub fn subset(&self, rows: &[usize]) -> Self {
        match self {
            Targets::Binary(labels) => Targets::Binary(rows.iter().map(|&r| labels[r]).collect()),
            Targets::Multiclass { classes, n_classes } => Targets::Multiclass {
                classes: rows.iter().map(|&r| classes[r]).collect(),
                n_classes: *n_classes,
            },
        }
    }
}

/// Fitted coefficients.
#[derive(Debug, Clone, PartialEq)]
pub enum Coefficients {
    /// Length `D`
    Binary(Array1<f64>),
    /// `D x C`
    Multiclass(Array2<f64>),
}

impl Coefficients {
    /// Fit the model family implied by `targets` on `x` (`D x M`).
    pub fn fit(x: ArrayView2<f64>, targets: &Targets, lambda: f64, max_iterations: usize) -> Self {
        match targets {
            Targets::Binary(labels) => {
                Coefficients::Binary(fit_binary(x, labels, lambda, max_iterations))
            }
            Targets::Multiclass { classes, n_classes } => Coefficients::Multiclass(
                fit_multinomial(x, classes, *n_classes, lambda, max_iterations),
            ),
        }
    }

    /// Fraction of observations whose predicted label matches `targets`.
    pub fn accuracy(&self, x: ArrayView2<f64>, targets: &Targets) -> f64 {
        if targets.is_empty() {
            return 0.0;
        }
        let correct = match (self, targets) {
            (Coefficients::Binary(w), Targets::Binary(labels)) => {
                let margins = x.t().dot(w);
                margins
                    .iter()
                    .zip(labels)
                    .filter(|&(&m, &y)| (if m >= 0.0 { 1.0 } else { -1.0 }) == y)
                    .count()
            }
            (Coefficients::Multiclass(w), Targets::Multiclass { classes, .. }) => {
                let scores = w.t().dot(&x);
                scores
                    .axis_iter(Axis(1))
                    .zip(classes)
                    .filter(|(column, class)| argmax(column.view()) == **class)
                    .count()
            }
            _ => 0,
        };
        correct as f64 / targets.len() as f64
    }
}

/// Index of the largest entry; the first wins ties.
pub fn argmax(values: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate() {
        if v > values[best] {
            best = i;
        }
    }
    best
}

/// Binary logistic regression on `+1` / `-1` labels.
pub fn fit_binary(
    x: ArrayView2<f64>,
    labels: &[f64],
    lambda: f64,
    max_iterations: usize,
) -> Array1<f64> {
    let y = Array1::from(labels.to_vec());
    let objective = |w: &Array1<f64>| {
        let z = x.t().dot(w) * &y;
        let loss = z.iter().map(|&zi| softplus(-zi)).sum::<f64>() + 0.5 * lambda * w.dot(w);
        let weights = z.mapv(|zi| -sigmoid(-zi)) * &y;
        let gradient = x.dot(&weights) + &(w * lambda);
        (loss, gradient)
    };
    lbfgs(objective, Array1::zeros(x.nrows()), max_iterations)
}

/// Multinomial logistic regression; `classes` are 0-based.
pub fn fit_multinomial(
    x: ArrayView2<f64>,
    classes: &[usize],
    n_classes: usize,
    lambda: f64,
    max_iterations: usize,
) -> Array2<f64> {
    let d = x.nrows();
    let mut one_hot = Array2::<f64>::zeros((n_classes, classes.len()));
    for (i, &class) in classes.iter().enumerate() {
        one_hot[[class, i]] = 1.0;
    }

    let objective = |flat: &Array1<f64>| {
        let w = unflatten(flat, d, n_classes);
        let scores = w.t().dot(&x);
        let mut probabilities = Array2::<f64>::zeros(scores.raw_dim());
        let mut loss = 0.5 * lambda * flat.dot(flat);
        for (i, column) in scores.axis_iter(Axis(1)).enumerate() {
            let max = column.fold(f64::NEG_INFINITY, |m, &s| m.max(s));
            let log_norm = max + column.mapv(|s| (s - max).exp()).sum().ln();
            loss += log_norm - column[classes[i]];
            probabilities
                .column_mut(i)
                .assign(&column.mapv(|s| (s - log_norm).exp()));
        }
        let gradient = x.dot(&(probabilities - &one_hot).t()) + &(w * lambda);
        (loss, Array1::from_iter(gradient.iter().copied()))
    };

    let flat = lbfgs(objective, Array1::zeros(d * n_classes), max_iterations);
    unflatten(&flat, d, n_classes)
}

fn unflatten(flat: &Array1<f64>, rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| flat[r * cols + c])
}

/// Limited-memory BFGS with Armijo backtracking.
fn lbfgs<F>(objective: F, start: Array1<f64>, max_iterations: usize) -> Array1<f64>
where
    F: Fn(&Array1<f64>) -> (f64, Array1<f64>),
{
    let mut x = start;
    let (mut fx, mut g) = objective(&x);
    let mut history: VecDeque<(Array1<f64>, Array1<f64>, f64)> = VecDeque::with_capacity(HISTORY);

    for _ in 0..max_iterations {
        let g_norm = g.dot(&g).sqrt();
        if g_norm <= GRADIENT_TOLERANCE * (1.0 + fx.abs()) {
            break;
        }

        // two-loop recursion
        let mut q = g.clone();
        let mut alphas = Vec::with_capacity(history.len());
        for (s, y, rho) in history.iter().rev() {
            let alpha = rho * s.dot(&q);
            q.scaled_add(-alpha, y);
            alphas.push(alpha);
        }
        let gamma = match history.back() {
            Some((s, y, _)) => s.dot(y) / y.dot(y),
            None => 1.0 / g_norm.max(1.0),
        };
        let mut r = q * gamma;
        for ((s, y, rho), alpha) in history.iter().zip(alphas.iter().rev()) {
            let beta = rho * y.dot(&r);
            r.scaled_add(alpha - beta, s);
        }

        let mut direction = -r;
        let mut slope = g.dot(&direction);
        if slope >= 0.0 {
            direction = -&g;
            slope = -g_norm * g_norm;
            history.clear();
        }

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_LINE_SEARCH {
            let candidate = &x + &(&direction * step);
            let (f_new, g_new) = objective(&candidate);
            if f_new.is_finite() && f_new <= fx + ARMIJO * step * slope {
                accepted = Some((candidate, f_new, g_new));
                break;
            }
            step *= 0.5;
        }
        let Some((x_new, f_new, g_new)) = accepted else {
            break;
        };

        let s = &x_new - &x;
        let y = &g_new - &g;
        let sy = s.dot(&y);
        if sy > 1e-12 {
            if history.len() == HISTORY {
                history.pop_front();
            }
            history.push_back((s, y, 1.0 / sy));
        }

        let improvement = fx - f_new;
        x = x_new;
        fx = f_new;
        g = g_new;
        if improvement.abs() <= 1e-12 * fx.abs().max(1.0) {
            break;
        }
    }
    x
}

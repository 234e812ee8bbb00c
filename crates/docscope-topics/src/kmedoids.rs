//! K-medoids over a precomputed distance matrix, used to pick diverse
//! representative documents from a topic.

use ndarray::ArrayView2;

const MAX_ITERATIONS: usize = 100;

/// Choose `k` medoids from the rows of a square distance matrix.
///
/// Deterministic: greedy BUILD initialisation followed by alternating
/// assignment and medoid update until the medoid set is stable. Returns
/// sorted row indices. When `k >= n` every row is returned.
pub fn kmedoids(distances: ArrayView2<f32>, k: usize) -> Vec<usize> {
    let n = distances.nrows();
    if k == 0 || n == 0 {
        return Vec::new();
    }
    if k >= n {
        return (0..n).collect();
    }

    let mut medoids = build_init(distances, k);
    for _ in 0..MAX_ITERATIONS {
        let assignment = assign(distances, &medoids);
        let updated: Vec<usize> = (0..medoids.len())
            .map(|cluster| {
                let members: Vec<usize> = (0..n).filter(|&i| assignment[i] == cluster).collect();
                best_medoid(distances, &members).unwrap_or(medoids[cluster])
            })
            .collect();
        if updated == medoids {
            break;
        }
        medoids = updated;
    }

    medoids.sort_unstable();
    medoids.dedup();
    medoids
}

/// Greedy initialisation: start at the most central point, then repeatedly
/// add the point that lowers total distance-to-nearest-medoid the most.
fn build_init(distances: ArrayView2<f32>, k: usize) -> Vec<usize> {
    let n = distances.nrows();
    let all: Vec<usize> = (0..n).collect();
    let first = best_medoid(distances, &all).unwrap_or(0);
    let mut medoids = vec![first];
    let mut nearest: Vec<f32> = (0..n).map(|i| distances[[i, first]]).collect();

    while medoids.len() < k {
        let mut best: Option<(usize, f32)> = None;
        for candidate in 0..n {
            if medoids.contains(&candidate) {
                continue;
            }
            let gain: f32 = (0..n)
                .map(|i| (nearest[i] - distances[[i, candidate]]).max(0.0))
                .sum();
            if best.map_or(true, |(_, g)| gain > g) {
                best = Some((candidate, gain));
            }
        }
        let Some((chosen, _)) = best else { break };
        medoids.push(chosen);
        for (i, d) in nearest.iter_mut().enumerate() {
            *d = d.min(distances[[i, chosen]]);
        }
    }
    medoids
}

/// Index (into `medoids`) of the nearest medoid for every row.
fn assign(distances: ArrayView2<f32>, medoids: &[usize]) -> Vec<usize> {
    (0..distances.nrows())
        .map(|i| {
            let mut best = 0;
            for (m, &medoid) in medoids.iter().enumerate() {
                if distances[[i, medoid]] < distances[[i, medoids[best]]] {
                    best = m;
                }
            }
            best
        })
        .collect()
}

/// Member with the smallest summed distance to the other members.
fn best_medoid(distances: ArrayView2<f32>, members: &[usize]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for &candidate in members {
        let cost: f32 = members.iter().map(|&m| distances[[candidate, m]]).sum();
        if best.map_or(true, |(_, c)| cost < c) {
            best = Some((candidate, cost));
        }
    }
    best.map(|(m, _)| m)
}

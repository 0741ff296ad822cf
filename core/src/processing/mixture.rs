//! Gaussian mixture clustering with diagonal covariances, fitted by EM.
//!
//! Columns are standardised first so hertz and decibels weigh alike. The
//! fit is deterministic: the weakest point seeds the first component, each
//! further seed is the point farthest from every seed so far, and a few
//! k-means rounds turn the seeds into the starting responsibilities.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

const KMEANS_ROUNDS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixtureParams {
    pub components: usize,
    pub max_iter: usize,
    /// Stop once the mean log-likelihood moves less than this.
    pub tol: f64,
    /// Added to every variance so single-valued columns stay fittable.
    pub reg_covar: f64,
}

impl Default for MixtureParams {
    fn default() -> Self {
        Self {
            components: 2,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

/// Returns one component index per row of `points`. Every point gets a
/// label; components left without points simply never appear.
pub fn mixture_labels(points: ArrayView2<f64>, params: &MixtureParams) -> Vec<i32> {
    let n = points.nrows();
    if n == 0 {
        return Vec::new();
    }

    let data = standardise(points);
    let seeds = farthest_point_seeds(&data, params.components.clamp(1, n));
    let mut resp = one_hot(&kmeans(&data, seeds), n);

    let mut previous = f64::NEG_INFINITY;
    for round in 0..params.max_iter.max(1) {
        let fit = Components::fit(&data, &resp, params.reg_covar);
        let (next, log_likelihood) = fit.responsibilities(&data);
        resp = next;
        if (log_likelihood - previous).abs() < params.tol {
            log::trace!("mixture converged after {} rounds", round + 1);
            break;
        }
        previous = log_likelihood;
    }

    resp.outer_iter()
        .map(|row| argmax(row) as i32)
        .collect()
}

fn standardise(points: ArrayView2<f64>) -> Array2<f64> {
    let mut data = points.to_owned();
    for mut column in data.columns_mut() {
        let mean = column.mean().unwrap_or(0.0);
        let std = column.std(0.0);
        let scale = if std > 0.0 && std.is_finite() { std } else { 1.0 };
        column.mapv_inplace(|v| (v - mean) / scale);
    }
    data
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn argmax(row: ArrayView1<f64>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Stops early when the remaining points all coincide with a seed.
fn farthest_point_seeds(data: &Array2<f64>, k: usize) -> Array2<f64> {
    let n = data.nrows();
    let power = data.ncols().saturating_sub(1);
    let weakest = (0..n)
        .min_by(|&a, &b| data[[a, power]].total_cmp(&data[[b, power]]))
        .unwrap_or(0);

    let mut chosen = vec![weakest];
    let mut nearest: Vec<f64> = data
        .outer_iter()
        .map(|row| squared_distance(row, data.row(weakest)))
        .collect();
    while chosen.len() < k {
        let (next, distance) = nearest
            .iter()
            .copied()
            .enumerate()
            .fold((0, 0.0), |best, (i, d)| if d > best.1 { (i, d) } else { best });
        if distance <= 0.0 {
            break;
        }
        chosen.push(next);
        for (i, row) in data.outer_iter().enumerate() {
            nearest[i] = nearest[i].min(squared_distance(row, data.row(next)));
        }
    }
    data.select(Axis(0), &chosen)
}

fn kmeans(data: &Array2<f64>, mut centres: Array2<f64>) -> Vec<usize> {
    let mut labels = vec![usize::MAX; data.nrows()];
    for _ in 0..KMEANS_ROUNDS {
        let assigned: Vec<usize> = data
            .outer_iter()
            .map(|row| {
                let distances = centres
                    .outer_iter()
                    .map(|centre| -squared_distance(row, centre))
                    .collect::<Array1<f64>>();
                argmax(distances.view())
            })
            .collect();
        if assigned == labels {
            break;
        }
        labels = assigned;

        for (j, mut centre) in centres.outer_iter_mut().enumerate() {
            let members: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == j).collect();
            if let Some(mean) = data.select(Axis(0), &members).mean_axis(Axis(0)) {
                centre.assign(&mean);
            }
        }
    }
    labels
}

fn one_hot(labels: &[usize], n: usize) -> Array2<f64> {
    let k = labels.iter().copied().max().map_or(1, |max| max + 1);
    let mut resp = Array2::zeros((n, k));
    for (i, &label) in labels.iter().enumerate() {
        resp[[i, label]] = 1.0;
    }
    resp
}

struct Components {
    log_weights: Array1<f64>,
    means: Array2<f64>,
    variances: Array2<f64>,
}

impl Components {
    /// M-step: weighted means and per-dimension variances.
    fn fit(data: &Array2<f64>, resp: &Array2<f64>, reg_covar: f64) -> Self {
        let n = data.nrows() as f64;
        let counts = resp.sum_axis(Axis(0)).mapv(|c| c + 10.0 * f64::EPSILON);
        let means = resp.t().dot(data) / &counts.view().insert_axis(Axis(1));

        let mut variances = Array2::zeros(means.raw_dim());
        for (j, mut variance) in variances.outer_iter_mut().enumerate() {
            for (i, row) in data.outer_iter().enumerate() {
                let weight = resp[[i, j]];
                for (d, v) in variance.iter_mut().enumerate() {
                    *v += weight * (row[d] - means[[j, d]]).powi(2);
                }
            }
            variance.mapv_inplace(|v| v / counts[j] + reg_covar);
        }

        Self {
            log_weights: counts.mapv(|c| (c / n).ln()),
            means,
            variances,
        }
    }

    /// E-step: normalised responsibilities and the mean log-likelihood.
    fn responsibilities(&self, data: &Array2<f64>) -> (Array2<f64>, f64) {
        let k = self.means.nrows();
        let mut resp = Array2::zeros((data.nrows(), k));
        let mut total = 0.0;
        for (i, row) in data.outer_iter().enumerate() {
            let mut log_prob = resp.row_mut(i);
            for j in 0..k {
                let exponent: f64 = row
                    .iter()
                    .zip(self.means.row(j))
                    .zip(self.variances.row(j))
                    .map(|((x, mu), var)| (2.0 * PI * var).ln() + (x - mu).powi(2) / var)
                    .sum();
                log_prob[j] = self.log_weights[j] - 0.5 * exponent;
            }
            let max = log_prob.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
            let log_norm = max + log_prob.mapv(|v| (v - max).exp()).sum().ln();
            log_prob.mapv_inplace(|v| (v - log_norm).exp());
            total += log_norm;
        }
        (resp, total / data.nrows() as f64)
    }
}

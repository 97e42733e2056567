//! Two-sample Kolmogorov-Smirnov test.
//!
//! P-values are exact (lattice-path count over every interleaving of the two
//! samples) while both samples hold at most [`MAX_EXACT_N`] values. Larger
//! samples use the asymptotic Kolmogorov tail at `sqrt(nm / (n + m)) * D`.

use serde::{Deserialize, Serialize};

/// Largest per-sample size that gets an exact p-value.
pub const MAX_EXACT_N: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KsResult {
    /// Largest absolute gap between the two empirical CDFs.
    pub statistic: f64,
    pub pvalue: f64,
}

/// Survival function of the Kolmogorov distribution, `P(K > lambda)`.
pub fn kolmogorov_sf(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < 1.18 {
        // Small arguments converge faster through the Jacobi theta form of the CDF.
        let y = -std::f64::consts::PI.powi(2) / (8.0 * lambda * lambda);
        let w = y.exp();
        let cdf = (2.0 * std::f64::consts::PI).sqrt() / lambda
            * (w + w.powi(9) + w.powi(25) + w.powi(49));
        return (1.0 - cdf).clamp(0.0, 1.0);
    }
    let mut sum = 0.0;
    for k in 1..=100 {
        let term = (-2.0 * (k * k) as f64 * lambda * lambda).exp();
        sum += if k % 2 == 1 { term } else { -term };
        if term < 1e-16 {
            break;
        }
    }
    (2.0 * sum).clamp(0.0, 1.0)
}

fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Exact `P(D >= statistic)` for samples of size `n` and `m`.
///
/// Walks the `(n + 1) x (m + 1)` grid one row at a time, carrying the
/// probability of reaching each point without having left the band
/// `|i/n - j/m| < statistic`. Mass that lands outside the band is the p-value.
pub fn exact_pvalue(statistic: f64, n: usize, m: usize) -> f64 {
    if statistic <= 0.0 {
        return 1.0;
    }
    let g = gcd(n, m);
    let (step_i, step_j) = ((m / g) as i64, (n / g) as i64);
    // Distances are compared on the integer lcm(n, m) scale.
    let h = (statistic * (n / g * m) as f64).round() as i64;
    let outside = |i: usize, j: usize| (i as i64 * step_i - j as i64 * step_j).abs() >= h;

    let mut escaped = 0.0;
    let mut row = vec![0.0f64; m + 1];
    for i in 0..=n {
        for j in 0..=m {
            let mass = if i == 0 && j == 0 {
                1.0
            } else {
                let from_above = if i > 0 {
                    let (ra, rb) = ((n - i + 1) as f64, (m - j) as f64);
                    row[j] * ra / (ra + rb)
                } else {
                    0.0
                };
                let from_left = if j > 0 {
                    let (ra, rb) = ((n - i) as f64, (m - j + 1) as f64);
                    row[j - 1] * rb / (ra + rb)
                } else {
                    0.0
                };
                from_above + from_left
            };
            if outside(i, j) {
                escaped += mass;
                row[j] = 0.0;
            } else {
                row[j] = mass;
            }
        }
    }
    escaped.clamp(0.0, 1.0)
}

/// Test the hypothesis that `a` and `b` come from the same distribution.
/// NaN values are ignored; returns `None` when either sample is empty.
pub fn ks_2samp(a: &[f64], b: &[f64]) -> Option<KsResult> {
    let mut a: Vec<f64> = a.iter().copied().filter(|v| !v.is_nan()).collect();
    let mut b: Vec<f64> = b.iter().copied().filter(|v| !v.is_nan()).collect();
    if a.is_empty() || b.is_empty() {
        return None;
    }
    a.sort_by(f64::total_cmp);
    b.sort_by(f64::total_cmp);
    let (n, m) = (a.len() as f64, b.len() as f64);

    let (mut i, mut j) = (0, 0);
    let mut statistic: f64 = 0.0;
    while i < a.len() && j < b.len() {
        let v = a[i].min(b[j]);
        while i < a.len() && a[i] <= v {
            i += 1;
        }
        while j < b.len() && b[j] <= v {
            j += 1;
        }
        statistic = statistic.max((i as f64 / n - j as f64 / m).abs());
    }

    let pvalue = if a.len().max(b.len()) <= MAX_EXACT_N {
        exact_pvalue(statistic, a.len(), b.len())
    } else {
        kolmogorov_sf((n * m / (n + m)).sqrt() * statistic)
    };
    Some(KsResult { statistic, pvalue })
}

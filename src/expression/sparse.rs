//! Scalar products against implicitly z-scored sparse count vectors.
//!
//! An entity stores only its nonzero counts. Its z-scored vector is
//!
//! ```text
//! z[i] = (x[i] - mean) / σ,   mean = sum1 / N,   σ = sqrt(sum2 / N - mean²)
//! ```
//!
//! which is dense: every zero count becomes `-mean / σ`. We never build it.
//! Instead the product with a dense vector `v` is split as
//!
//! ```text
//! z · v = (-mean / σ) × Σ v[i]  +  Σ_{x[i] ≠ 0} (x[i] / σ) × v[i]
//! ```
//!
//! The first term is the "zero contribution" baseline. When `Σ v` is known
//! up front (the LSH engine precomputes it per hyperplane) the whole product
//! costs O(nnz).

use crate::error::{Error, Result};
use crate::{EntityId, FeatureId};

/// Mean and inverse standard deviation of one entity's full count vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    /// `sum1 / N`.
    pub mean: f64,
    /// `1 / σ`.
    pub sigma_inverse: f64,
}

impl ZScore {
    /// Derive the z-score parameters from cached sums over `n` features.
    ///
    /// # Errors
    ///
    /// [`Error::EmptyInput`] when `n == 0`, [`Error::ZeroVariance`] when the
    /// vector is constant (σ is zero or not finite).
    pub fn from_sums(entity: EntityId, sum1: f64, sum2: f64, n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::EmptyInput);
        }
        let n = n as f64;
        let mean = sum1 / n;
        let variance = sum2 / n - mean * mean;
        let sigma_inverse = 1.0 / variance.sqrt();
        if !(variance > 0.0) || !sigma_inverse.is_finite() {
            return Err(Error::ZeroVariance { entity });
        }
        Ok(Self {
            mean,
            sigma_inverse,
        })
    }

    /// Value every zero count takes after normalization.
    #[inline]
    pub fn zero_contribution(&self) -> f64 {
        -self.mean * self.sigma_inverse
    }
}

/// Scalar product of the z-scored vector with `v`.
///
/// The baseline is accumulated over all of `v`, then each nonzero count adds
/// `(count / σ) × v[feature]`. `v` must cover every feature id in `entries`.
pub fn scalar_product(entries: &[(FeatureId, f32)], z: &ZScore, v: &[f64]) -> f64 {
    let zero_contribution = z.zero_contribution();
    let mut product = 0.0;
    for &x in v {
        product += x * zero_contribution;
    }
    add_nonzero_terms(product, entries, z, v)
}

/// Same as [`scalar_product`] with `Σ v` supplied by the caller.
///
/// This is the O(nnz) form used when one `v` is applied to many entities.
pub fn scalar_product_with_sum(
    entries: &[(FeatureId, f32)],
    z: &ZScore,
    v: &[f64],
    v_sum: f64,
) -> f64 {
    add_nonzero_terms(v_sum * z.zero_contribution(), entries, z, v)
}

fn add_nonzero_terms(mut product: f64, entries: &[(FeatureId, f32)], z: &ZScore, v: &[f64]) -> f64 {
    for &(feature, count) in entries {
        product += z.sigma_inverse * f64::from(count) * v[feature as usize];
    }
    product
}

/// Pearson correlation of two sparse count vectors of length `n`.
///
/// Both entry lists must be sorted by feature id. Only shared nonzero
/// features contribute to the cross term.
pub fn correlation(
    a: &[(FeatureId, f32)],
    za: &ZScore,
    b: &[(FeatureId, f32)],
    zb: &ZScore,
    n: usize,
) -> f64 {
    let mut cross = 0.0;
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                cross += f64::from(a[i].1) * f64::from(b[j].1);
                i += 1;
                j += 1;
            }
        }
    }
    let covariance = cross / n as f64 - za.mean * zb.mean;
    covariance * za.sigma_inverse * zb.sigma_inverse
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_z(dense: &[f64]) -> Vec<f64> {
        let n = dense.len() as f64;
        let mean = dense.iter().sum::<f64>() / n;
        let var = dense.iter().map(|x| x * x).sum::<f64>() / n - mean * mean;
        dense.iter().map(|x| (x - mean) / var.sqrt()).collect()
    }

    #[test]
    fn matches_dense_z_score_product() {
        let dense = [0.0, 3.0, 0.0, 1.0, 5.0, 0.0];
        let entries: Vec<(FeatureId, f32)> = dense
            .iter()
            .enumerate()
            .filter(|(_, &c)| c != 0.0)
            .map(|(i, &c)| (i as FeatureId, c as f32))
            .collect();
        let sum1: f64 = dense.iter().sum();
        let sum2: f64 = dense.iter().map(|x| x * x).sum();
        let z = ZScore::from_sums(0, sum1, sum2, dense.len()).unwrap();
        let v = [0.3, -0.2, 0.9, 0.1, -0.4, 0.25];

        let expected: f64 = dense_z(&dense).iter().zip(v.iter()).map(|(a, b)| a * b).sum();
        assert!((scalar_product(&entries, &z, &v) - expected).abs() < 1e-12);

        let v_sum: f64 = v.iter().sum();
        assert!((scalar_product_with_sum(&entries, &z, &v, v_sum) - expected).abs() < 1e-12);
    }

    #[test]
    fn constant_vector_is_rejected() {
        // Four features, all equal to 2.
        let err = ZScore::from_sums(7, 8.0, 16.0, 4).unwrap_err();
        assert_eq!(err, Error::ZeroVariance { entity: 7 });
        // All zero.
        assert!(ZScore::from_sums(1, 0.0, 0.0, 4).is_err());
        assert_eq!(ZScore::from_sums(1, 1.0, 1.0, 0), Err(Error::EmptyInput));
    }

    #[test]
    fn correlation_of_vector_with_itself_is_one() {
        let a = vec![(0, 1.0), (2, 4.0), (3, 2.0)];
        let z = ZScore::from_sums(0, 7.0, 21.0, 5).unwrap();
        assert!((correlation(&a, &z, &a, &z, 5) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn correlation_matches_dense_pearson() {
        let x = [1.0, 0.0, 2.0, 0.0, 4.0];
        let y = [0.0, 3.0, 2.0, 1.0, 5.0];
        let sparse = |d: &[f64]| -> Vec<(FeatureId, f32)> {
            d.iter()
                .enumerate()
                .filter(|(_, &c)| c != 0.0)
                .map(|(i, &c)| (i as FeatureId, c as f32))
                .collect()
        };
        let stats = |d: &[f64]| {
            ZScore::from_sums(0, d.iter().sum(), d.iter().map(|v| v * v).sum(), d.len()).unwrap()
        };
        let expected: f64 = dense_z(&x)
            .iter()
            .zip(dense_z(&y).iter())
            .map(|(a, b)| a * b)
            .sum::<f64>()
            / x.len() as f64;
        let got = correlation(&sparse(&x), &stats(&x), &sparse(&y), &stats(&y), x.len());
        assert!((got - expected).abs() < 1e-12);
    }
}

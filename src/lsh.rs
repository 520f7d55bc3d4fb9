//! Locality-sensitive hashing with random hyperplanes.
//!
//! The similarity between two entities is the cosine of the angle between
//! their z-scored count vectors. A random unit vector `r` splits space with
//! the hyperplane orthogonal to it; two vectors fall on the same side with
//! probability `1 - θ/π`. With `M` independent hyperplanes:
//!
//! ```text
//! θ ≈ π × (1 - same_sign / M)        similarity ≈ cos θ
//! ```
//!
//! Hyperplanes are indexed by `(band, row)` as in the banding technique of
//! Leskovec, Rajaraman & Ullman, *Mining of Massive Datasets* §3.4-3.7. Here
//! the grid is only an index: the estimator flattens it to `M = bands × rows`
//! bits.
//!
//! Random unit vectors use Marsaglia (1972): draw i.i.d. standard normal
//! components, then scale to unit length.
//!
//! The engine holds no state between calls. Vector banks and signatures are
//! owned by the caller.

use crate::error::{Error, Result};
use crate::expression::{sparse, ExpressionStore};
use crate::EntityId;
use bitvec::prelude::*;
use rand::prelude::*;
use rand_distr::StandardNormal;
use std::f64::consts::PI;

/// One bit per hyperplane; bit `band * rows + row` is set when the scalar
/// product with that hyperplane is strictly positive.
pub type Signature = BitVec<u64, Lsb0>;

/// Shape and seed of an LSH vector bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LshParams {
    /// Number of bands.
    pub band_count: usize,
    /// Rows per band.
    pub row_count: usize,
    /// Seed for the generator.
    pub seed: u64,
}

impl LshParams {
    /// Create parameters for `band_count × row_count` hyperplanes.
    pub fn new(band_count: usize, row_count: usize) -> Self {
        Self {
            band_count,
            row_count,
            seed: 231,
        }
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total number of hyperplanes (signature bits).
    pub fn bit_count(&self) -> usize {
        self.band_count * self.row_count
    }

    /// Reject empty banks.
    pub fn validate(&self) -> Result<()> {
        if self.band_count == 0 {
            return Err(Error::InvalidParameter {
                name: "band_count",
                message: "must be at least 1",
            });
        }
        if self.row_count == 0 {
            return Err(Error::InvalidParameter {
                name: "row_count",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

impl Default for LshParams {
    fn default() -> Self {
        Self::new(16, 64)
    }
}

/// Random unit vectors indexed by `(band, row)`.
#[derive(Debug, Clone)]
pub struct LshVectors {
    band_count: usize,
    row_count: usize,
    dimension: usize,
    // Row-major [band][row][feature].
    components: Vec<f64>,
}

impl LshVectors {
    /// Generate a bank of unit vectors of length `dimension`.
    ///
    /// Same `params` and `dimension` always give the same bank.
    pub fn generate(params: &LshParams, dimension: usize) -> Result<Self> {
        params.validate()?;
        if dimension == 0 {
            return Err(Error::EmptyInput);
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut components = Vec::with_capacity(params.bit_count() * dimension);
        for _ in 0..params.bit_count() {
            let start = components.len();
            components.extend((0..dimension).map(|_| rng.sample::<f64, _>(StandardNormal)));

            let vector = &mut components[start..];
            let norm = vector.iter().map(|x| x * x).sum::<f64>().sqrt();
            if !(norm > 0.0) {
                return Err(Error::Other("degenerate random vector".into()));
            }
            let factor = 1.0 / norm;
            vector.iter_mut().for_each(|x| *x *= factor);
        }

        Ok(Self {
            band_count: params.band_count,
            row_count: params.row_count,
            dimension,
            components,
        })
    }

    /// Number of bands.
    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Rows per band.
    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Length of each vector.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Total number of vectors.
    pub fn len(&self) -> usize {
        self.band_count * self.row_count
    }

    /// True for an empty bank (never produced by [`LshVectors::generate`]).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector for `(band, row)`, or `None` when either is out of range.
    pub fn vector(&self, band: usize, row: usize) -> Option<&[f64]> {
        if band >= self.band_count || row >= self.row_count {
            return None;
        }
        let start = (band * self.row_count + row) * self.dimension;
        self.components.get(start..start + self.dimension)
    }

    /// All vectors in flattened `(band, row)` order.
    pub fn iter(&self) -> impl Iterator<Item = &[f64]> {
        self.components.chunks_exact(self.dimension)
    }

    /// Σ of each vector's components, in flattened order.
    pub fn component_sums(&self) -> Vec<f64> {
        self.iter().map(|v| v.iter().sum()).collect()
    }

    fn check_store<S: ExpressionStore + ?Sized>(&self, store: &S) -> Result<()> {
        if store.feature_count() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                found: store.feature_count(),
            });
        }
        Ok(())
    }
}

/// Scalar products of one entity against every vector of the bank.
///
/// Recomputes the zero baseline per vector; use [`signatures`] for many
/// entities.
pub fn scalar_products<S: ExpressionStore + ?Sized>(
    store: &S,
    vectors: &LshVectors,
    entity: EntityId,
) -> Result<Vec<f64>> {
    vectors.check_store(store)?;
    let z = store.z_score(entity)?;
    let entries = store.nonzero_entries(entity)?;
    Ok(vectors
        .iter()
        .map(|v| sparse::scalar_product(entries, &z, v))
        .collect())
}

/// Signatures of `entities`, in the same order.
///
/// Each vector's component sum is computed once and shared, so the cost per
/// entity is O(nnz × M).
pub fn signatures<S: ExpressionStore + ?Sized>(
    store: &S,
    vectors: &LshVectors,
    entities: &[EntityId],
) -> Result<Vec<Signature>> {
    vectors.check_store(store)?;
    let bit_count = vectors.len();
    let sums = vectors.component_sums();
    let mut products = vec![0.0; bit_count];

    let mut out = Vec::with_capacity(entities.len());
    for (i, &entity) in entities.iter().enumerate() {
        if i % 100 == 0 {
            tracing::trace!(entity, done = i, total = entities.len(), "computing LSH signatures");
        }

        let z = store.z_score(entity)?;
        let zero_contribution = z.zero_contribution();
        for (p, &sum) in products.iter_mut().zip(&sums) {
            *p = sum * zero_contribution;
        }

        for &(feature, count) in store.nonzero_entries(entity)? {
            let scaled = z.sigma_inverse * f64::from(count);
            let feature = feature as usize;
            for (p, v) in products.iter_mut().zip(vectors.iter()) {
                *p += scaled * v[feature];
            }
        }

        let mut signature: Signature = bitvec![u64, Lsb0; 0; bit_count];
        for (index, &p) in products.iter().enumerate() {
            if p > 0.0 {
                signature.set(index, true);
            }
        }
        out.push(signature);
    }
    Ok(out)
}

fn angle(same_sign: usize, total: usize) -> f64 {
    PI * (1.0 - same_sign as f64 / total as f64)
}

/// Estimated angle between two entities from their signatures.
pub fn angle_from_signatures(a: &Signature, b: &Signature) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::SignatureLengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(Error::EmptyInput);
    }
    let same = a
        .iter()
        .by_vals()
        .zip(b.iter().by_vals())
        .filter(|(x, y)| x == y)
        .count();
    Ok(angle(same, a.len()))
}

/// Estimated similarity (cosine of the estimated angle) from signatures.
pub fn similarity_from_signatures(a: &Signature, b: &Signature) -> Result<f64> {
    angle_from_signatures(a, b).map(f64::cos)
}

/// Estimated angle from two raw scalar-product sets.
///
/// Signs are compared with `copysign`, so `-0.0` and `0.0` disagree.
pub fn angle_from_scalar_products(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(Error::SignatureLengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(Error::EmptyInput);
    }
    let same = a
        .iter()
        .zip(b)
        .filter(|(x, y)| 1f64.copysign(**x) == 1f64.copysign(**y))
        .count();
    Ok(angle(same, a.len()))
}

/// Estimated angle between two entities using an existing bank.
pub fn approximate_angle<S: ExpressionStore + ?Sized>(
    store: &S,
    vectors: &LshVectors,
    entity0: EntityId,
    entity1: EntityId,
) -> Result<f64> {
    let p0 = scalar_products(store, vectors, entity0)?;
    let p1 = scalar_products(store, vectors, entity1)?;
    angle_from_scalar_products(&p0, &p1)
}

/// Estimated similarity of two entities.
///
/// Regenerates the vector bank on every call; meant for spot checks.
pub fn approximate_similarity<S: ExpressionStore + ?Sized>(
    store: &S,
    params: &LshParams,
    entity0: EntityId,
    entity1: EntityId,
) -> Result<f64> {
    let vectors = LshVectors::generate(params, store.feature_count())?;
    approximate_angle(store, &vectors, entity0, entity1).map(f64::cos)
}

/// Exact versus estimated similarity for one entity pair.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimilarityComparison {
    /// First entity.
    pub entity0: EntityId,
    /// Second entity.
    pub entity1: EntityId,
    /// Exact Pearson similarity.
    pub exact: f64,
    /// LSH estimate.
    pub approximate: f64,
    /// `approximate - exact`.
    pub delta: f64,
}

/// Compare LSH estimates with exact similarity for every pair of `entities`.
pub fn compare_with_exact<S: ExpressionStore + ?Sized>(
    store: &S,
    params: &LshParams,
    entities: &[EntityId],
) -> Result<Vec<SimilarityComparison>> {
    let vectors = LshVectors::generate(params, store.feature_count())?;
    let sigs = signatures(store, &vectors, entities)?;

    let mut out = Vec::new();
    for i in 0..entities.len() {
        for j in (i + 1)..entities.len() {
            let exact = store.similarity(entities[i], entities[j])?;
            let approximate = similarity_from_signatures(&sigs[i], &sigs[j])?;
            out.push(SimilarityComparison {
                entity0: entities[i],
                entity1: entities[j],
                exact,
                approximate,
                delta: approximate - exact,
            });
        }
    }
    tracing::debug!(pairs = out.len(), "compared LSH and exact similarities");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ExpressionMatrix;

    fn store() -> ExpressionMatrix {
        let mut m = ExpressionMatrix::new(6);
        m.add_dense(&[5.0, 4.0, 0.0, 0.0, 1.0, 0.0]).unwrap();
        m.add_dense(&[6.0, 3.0, 0.0, 1.0, 1.0, 0.0]).unwrap();
        m.add_dense(&[0.0, 0.0, 7.0, 5.0, 0.0, 2.0]).unwrap();
        m
    }

    #[test]
    fn vectors_are_unit_and_reproducible() {
        let params = LshParams::new(3, 4).with_seed(7);
        let a = LshVectors::generate(&params, 10).unwrap();
        let b = LshVectors::generate(&params, 10).unwrap();
        assert_eq!(a.len(), 12);
        for v in a.iter() {
            let norm: f64 = v.iter().map(|x| x * x).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
        assert_eq!(a.vector(2, 3), b.vector(2, 3));
        assert!(a.vector(2, 3).is_some());
        assert_eq!(a.vector(3, 0), None);
        assert_eq!(a.vector(0, 4), None);

        let c = LshVectors::generate(&params.with_seed(8), 10).unwrap();
        assert_ne!(a.vector(0, 0), c.vector(0, 0));
    }

    #[test]
    fn empty_bank_is_rejected() {
        assert!(LshVectors::generate(&LshParams::new(0, 4), 10).is_err());
        assert!(LshVectors::generate(&LshParams::new(4, 0), 10).is_err());
        assert!(LshVectors::generate(&LshParams::new(4, 4), 0).is_err());
    }

    #[test]
    fn signature_bits_match_scalar_product_signs() {
        let m = store();
        let vectors = LshVectors::generate(&LshParams::new(4, 8), 6).unwrap();
        let sigs = signatures(&m, &vectors, &[0, 1, 2]).unwrap();
        for (entity, sig) in sigs.iter().enumerate() {
            let products = scalar_products(&m, &vectors, entity as EntityId).unwrap();
            assert_eq!(sig.len(), 32);
            for (bit, p) in sig.iter().by_vals().zip(products) {
                assert_eq!(bit, p > 0.0);
            }
        }
    }

    #[test]
    fn identical_signatures_give_similarity_one() {
        let m = store();
        let vectors = LshVectors::generate(&LshParams::new(2, 8), 6).unwrap();
        let sigs = signatures(&m, &vectors, &[0, 0]).unwrap();
        assert_eq!(angle_from_signatures(&sigs[0], &sigs[1]).unwrap(), 0.0);
        assert!((similarity_from_signatures(&sigs[0], &sigs[1]).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn opposite_signatures_give_similarity_minus_one() {
        let a: Signature = bitvec![u64, Lsb0; 1; 16];
        let b: Signature = bitvec![u64, Lsb0; 0; 16];
        assert!((angle_from_signatures(&a, &b).unwrap() - PI).abs() < 1e-12);
        assert!((similarity_from_signatures(&a, &b).unwrap() + 1.0).abs() < 1e-12);
    }

    #[test]
    fn mismatched_lengths_fail() {
        let a: Signature = bitvec![u64, Lsb0; 0; 8];
        let b: Signature = bitvec![u64, Lsb0; 0; 16];
        assert_eq!(
            angle_from_signatures(&a, &b),
            Err(Error::SignatureLengthMismatch { left: 8, right: 16 })
        );
        assert!(angle_from_scalar_products(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn signed_zero_counts_as_a_different_sign() {
        let angle = angle_from_scalar_products(&[0.0, 1.0], &[-0.0, 2.0]).unwrap();
        assert!((angle - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn estimate_tracks_exact_similarity() {
        let m = store();
        let params = LshParams::new(32, 64).with_seed(3);
        let rows = compare_with_exact(&m, &params, &[0, 1, 2]).unwrap();
        assert_eq!(rows.len(), 3);
        for row in rows {
            // 2048 hyperplanes: standard error of the angle is well under 0.1 rad.
            assert!(row.delta.abs() < 0.15, "{row:?}");
        }
    }

    fn mean_error(m: &ExpressionMatrix, band_count: usize, row_count: usize) -> f64 {
        let seeds = 0..20u64;
        let total: f64 = seeds
            .clone()
            .map(|seed| {
                let params = LshParams::new(band_count, row_count).with_seed(seed);
                compare_with_exact(m, &params, &[0, 1]).unwrap()[0].delta.abs()
            })
            .sum();
        total / seeds.count() as f64
    }

    #[test]
    fn estimate_error_shrinks_with_bit_count() {
        let m = store();
        let errors = [
            (16.0, mean_error(&m, 1, 16)),
            (256.0, mean_error(&m, 4, 64)),
            (4096.0, mean_error(&m, 64, 64)),
        ];
        for pair in errors.windows(2) {
            // 16x the bits: about a quarter of the error.
            assert!(pair[1].1 < pair[0].1 / 2.0, "{errors:?}");
        }
        for &(bits, error) in &errors {
            let scaled = error * f64::sqrt(bits);
            assert!(scaled > 0.1 && scaled < 2.0, "{errors:?}");
        }
    }

    #[test]
    fn store_dimension_must_match_bank() {
        let m = store();
        let vectors = LshVectors::generate(&LshParams::new(1, 1), 5).unwrap();
        assert!(signatures(&m, &vectors, &[0]).is_err());
    }
}

//! Similarity between cluster average vectors.

/// Scores how alike two dense vectors are.
///
/// Implementations are expected to be symmetric. Any
/// `Fn(&[f64], &[f64]) -> f64` is a scorer.
pub trait SimilarityScorer {
    /// Similarity of `a` and `b` (same length).
    fn score(&self, a: &[f64], b: &[f64]) -> f64;
}

impl<F> SimilarityScorer for F
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

/// Pearson correlation. Zero when either vector is constant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pearson;

impl SimilarityScorer for Pearson {
    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        let n = a.len().min(b.len());
        if n == 0 {
            return 0.0;
        }
        let (a, b) = (&a[..n], &b[..n]);
        let mean_a = a.iter().sum::<f64>() / n as f64;
        let mean_b = b.iter().sum::<f64>() / n as f64;
        let (mut cov, mut var_a, mut var_b) = (0.0, 0.0, 0.0);
        for (x, y) in a.iter().zip(b) {
            let dx = x - mean_a;
            let dy = y - mean_b;
            cov += dx * dy;
            var_a += dx * dx;
            var_b += dy * dy;
        }
        let denominator = (var_a * var_b).sqrt();
        if denominator > 0.0 {
            cov / denominator
        } else {
            0.0
        }
    }
}

/// Cosine of the angle between the vectors. Zero for a zero vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cosine;

impl SimilarityScorer for Cosine {
    fn score(&self, a: &[f64], b: &[f64]) -> f64 {
        let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
        let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm_a > 0.0 && norm_b > 0.0 {
            dot / (norm_a * norm_b)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pearson_is_symmetric_and_bounded() {
        let a = [1.0, 2.0, 3.0, 0.5];
        let b = [0.2, 0.1, 0.9, 0.4];
        let ab = Pearson.score(&a, &b);
        assert!((ab - Pearson.score(&b, &a)).abs() < 1e-15);
        assert!((-1.0..=1.0).contains(&ab));
        assert!((Pearson.score(&a, &[2.0, 4.0, 6.0, 1.0]) - 1.0).abs() < 1e-12);
        assert_eq!(Pearson.score(&a, &[1.0; 4]), 0.0);
    }

    #[test]
    fn cosine_handles_zero_vectors() {
        assert!((Cosine.score(&[1.0, 0.0], &[3.0, 0.0]) - 1.0).abs() < 1e-15);
        assert!(Cosine.score(&[1.0, 0.0], &[0.0, 2.0]).abs() < 1e-15);
        assert_eq!(Cosine.score(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn closures_are_scorers() {
        let constant = |_: &[f64], _: &[f64]| 0.25;
        assert_eq!(constant.score(&[1.0], &[2.0]), 0.25);
    }
}

//! Small dense-vector helpers shared by the vector index and the cache.

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}

/// Returns a unit-length copy of `v`. Zero (or non-finite) vectors stay zero.
pub fn l2_normalized(v: &[f32]) -> Vec<f32> {
    let n = norm(v);
    if !n.is_finite() || n <= f32::EPSILON {
        return vec![0.0; v.len()];
    }
    v.iter().map(|x| x / n).collect()
}

/// Cosine similarity; 0.0 when either side is zero or lengths differ.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = norm(a) * norm(b);
    if !denom.is_finite() || denom <= f32::EPSILON {
        return 0.0;
    }
    (dot(a, b) / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_parallel_vectors_is_one() {
        assert!((cosine(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_has_no_similarity() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(l2_normalized(&[0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn mismatched_lengths_have_no_similarity() {
        assert_eq!(cosine(&[1.0], &[1.0, 0.0]), 0.0);
    }
}

//! Vector similarity for semantic retrieval

/// Cosine similarity between two vectors.
///
/// `None` when the vectors differ in length, are empty, or either has zero
/// norm; callers treat `None` as a non-match.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }

    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 0.001);

        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).unwrap().abs() < 0.001);

        let c = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &c).unwrap() + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_scale_invariant() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![2.0, 4.0, 6.0];
        assert!((cosine_similarity(&a, &b).unwrap() - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_undefined_cases() {
        assert!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]).is_none());
        assert!(cosine_similarity(&[], &[]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]).is_none());
    }
}

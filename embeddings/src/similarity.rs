//! Similarity computation for embeddings.

use crate::Embedding;

/// Compute the cosine similarity between two embeddings, clamped to `[0, 1]`.
///
/// Negative similarity is treated as "unrelated" (0.0) and values pushed past
/// 1.0 by float error are pulled back to 1.0. Returns `None` when the vectors
/// are not comparable (different lengths), so callers can skip the pair.
/// A zero vector is comparable but similar to nothing.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Some(0.0);
    }

    let sim = dot_product / (magnitude_a * magnitude_b);
    if sim.is_nan() {
        return Some(0.0);
    }
    Some(sim.clamp(0.0, 1.0))
}

/// Cosine similarity where an incomparable pair counts as no evidence.
pub fn similarity_or_zero(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).unwrap_or(0.0)
}

/// Element-wise mean of several embeddings.
///
/// The first vector fixes the dimension; vectors of any other length are
/// ignored. Returns `None` for an empty input.
pub fn average<'a, I>(embeddings: I) -> Option<Embedding>
where
    I: IntoIterator<Item = &'a Embedding>,
{
    let mut iter = embeddings.into_iter();
    let first = iter.next()?;
    let dim = first.len();

    let mut sum = first.clone();
    let mut count = 1usize;
    for embedding in iter {
        if embedding.len() != dim {
            continue;
        }
        for (acc, val) in sum.iter_mut().zip(embedding.iter()) {
            *acc += val;
        }
        count += 1;
    }

    let n = count as f32;
    for x in sum.iter_mut() {
        *x /= n;
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![0.3, -1.2, 4.0];
        let sim = cosine_similarity(&a, &a).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        let sim = cosine_similarity(&a, &b).unwrap();
        assert!((sim - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite_is_clamped() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![-1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), Some(0.0));
    }

    #[test]
    fn test_cosine_similarity_stays_in_unit_range() {
        let vectors = [
            vec![1.0, 2.0, 3.0],
            vec![-3.0, 0.5, 2.0],
            vec![1e-3, 1e3, -7.0],
            vec![0.0, 0.0, 0.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let sim = cosine_similarity(a, b).unwrap();
                assert!((0.0..=1.0).contains(&sim), "{sim} out of range");
            }
        }
    }

    #[test]
    fn test_dimension_mismatch() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!(cosine_similarity(&a, &b).is_none());
        assert_eq!(similarity_or_zero(&a, &b), 0.0);
    }

    #[test]
    fn test_average_skips_foreign_dimensions() {
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0, 5.0]];
        assert_eq!(average(&vectors), Some(vec![0.5, 0.5]));
        assert_eq!(average(&Vec::<Embedding>::new()), None);
    }
}

//! Vector normalization and cosine similarity.

use ndarray::{Array1, Array2};

/// Scale `v` to unit L2 norm. A zero vector is returned unchanged.
pub fn l2_normalize(v: Array1<f32>) -> Array1<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v;
    }
    v / norm
}

/// Dot product of two equal-length vectors.
///
/// On unit vectors this is the cosine similarity.
///
/// # Panics
///
/// Panics if the lengths differ.
pub fn dot(a: &Array1<f32>, b: &Array1<f32>) -> f32 {
    assert_eq!(
        a.len(),
        b.len(),
        "embedding length mismatch: {} vs {}",
        a.len(),
        b.len()
    );
    a.dot(b)
}

/// `[texts × images]` matrix of pairwise dot products.
pub fn similarity_matrix(texts: &[Array1<f32>], images: &[Array1<f32>]) -> Array2<f32> {
    Array2::from_shape_fn((texts.len(), images.len()), |(i, j)| dot(&texts[i], &images[j]))
}

//! Appearance embeddings in unit-norm form.
//!
//! Every embedding that reaches the gallery has passed through [`normalize`],
//! so cosine similarity between two of them is a plain dot product.

use thiserror::Error;

/// Norms below this are treated as zero vectors and rejected.
pub const MIN_NORM: f64 = 1e-6;

/// An L2-normalized feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Cosine similarity in `[-1, 1]`.
    pub fn cosine(&self, other: &Embedding) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| a * b)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbeddingError {
    #[error("embedding has no components")]
    Empty,
    #[error("embedding has {actual} components, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("embedding norm {norm:e} is below {min:e}", min = MIN_NORM)]
    Degenerate { norm: f64 },
}

impl EmbeddingError {
    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            EmbeddingError::Empty => "empty",
            EmbeddingError::DimensionMismatch { .. } => "dimension",
            EmbeddingError::Degenerate { .. } => "degenerate",
        }
    }
}

/// Sanitize and L2-normalize a raw feature vector.
///
/// Non-finite components are zeroed before the norm is taken. When
/// `expected_dim` is set, vectors of any other length are rejected.
pub fn normalize(raw: &[f64], expected_dim: Option<usize>) -> Result<Embedding, EmbeddingError> {
    if raw.is_empty() {
        return Err(EmbeddingError::Empty);
    }
    if let Some(expected) = expected_dim {
        if raw.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: raw.len(),
            });
        }
    }

    let cleaned: Vec<f64> = raw
        .iter()
        .map(|v| if v.is_finite() { *v } else { 0.0 })
        .collect();

    // Scale by the largest magnitude first so squaring cannot overflow.
    let scale = cleaned.iter().fold(0.0_f64, |max, v| max.max(v.abs()));
    if scale == 0.0 {
        return Err(EmbeddingError::Degenerate { norm: 0.0 });
    }
    let rescaled = cleaned
        .iter()
        .map(|v| (v / scale).powi(2))
        .sum::<f64>()
        .sqrt();
    let norm = scale * rescaled;
    if norm < MIN_NORM {
        return Err(EmbeddingError::Degenerate { norm });
    }

    Ok(Embedding(
        cleaned.into_iter().map(|v| v / scale / rescaled).collect(),
    ))
}

//! Vector helpers shared by query building, embedding generation and scoring.

use sha1::{Digest, Sha1};

/// Stand-in token when there is nothing to hash.
pub const UNKNOWN_TOKEN: &str = "unknown";

pub fn norm(vector: &[f64]) -> f64 {
    vector.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Hash tokens into a unit vector of `dim` components.
///
/// Each token's SHA-1 digest bytes are added, as unsigned values, to the
/// leading components. An empty token list hashes [`UNKNOWN_TOKEN`].
pub fn hash_tokens<S: AsRef<str>>(tokens: &[S], dim: usize) -> Vec<f64> {
    let mut vector = vec![0.0; dim];
    let mut accumulate = |token: &str| {
        let digest = Sha1::digest(token.as_bytes());
        for (slot, byte) in vector.iter_mut().zip(digest.iter()) {
            *slot += *byte as f64;
        }
    };

    if tokens.is_empty() {
        accumulate(UNKNOWN_TOKEN);
    } else {
        for token in tokens {
            accumulate(token.as_ref());
        }
    }

    let n = norm(&vector);
    if n > 0.0 {
        for v in vector.iter_mut() {
            *v /= n;
        }
    }
    vector
}

/// Zero-pad or truncate `vector` to `dim` components.
pub fn fit_to_dimension(vector: &[f64], dim: usize) -> Vec<f64> {
    let mut fitted: Vec<f64> = vector.iter().copied().take(dim).collect();
    fitted.resize(dim, 0.0);
    fitted
}

/// Cosine similarity, `None` when either vector has zero norm or the result
/// is not a number.
pub fn cosine(a: &[f64], b: &[f64]) -> Option<f64> {
    let (norm_a, norm_b) = (norm(a), norm(b));
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let score = dot / (norm_a * norm_b);
    if score.is_nan() {
        None
    } else {
        Some(score)
    }
}

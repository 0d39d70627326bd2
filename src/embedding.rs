// Embedding pipeline: token vectors from a hosted feature-extraction model,
// mean-pooled and L2-normalized. The same procedure runs at publish time and
// at query time so cosine similarity stays meaningful.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde_json::json;

use crate::config::EmbeddingConfig;
use crate::error::{AppError, AppResult};

/// Elementwise average of per-token vectors into a single vector of the
/// model's hidden dimension.
pub fn mean_pool(vectors: &[Vec<f32>]) -> AppResult<Vec<f32>> {
    let first = vectors
        .first()
        .ok_or_else(|| AppError::Upstream("Embedding provider returned no token vectors".to_string()))?;
    let dim = first.len();
    if dim == 0 {
        return Err(AppError::Upstream(
            "Embedding provider returned zero-dimensional vectors".to_string(),
        ));
    }

    let mut mean = vec![0.0f32; dim];
    for vec in vectors {
        if vec.len() != dim {
            return Err(AppError::Upstream(
                "Embedding provider returned ragged token vectors".to_string(),
            ));
        }
        for (m, v) in mean.iter_mut().zip(vec) {
            *m += v;
        }
    }
    let n = vectors.len() as f32;
    for m in &mut mean {
        *m /= n;
    }
    Ok(mean)
}

/// Scale to unit L2 norm so cosine similarity and dot product coincide.
pub fn normalize(mut vec: Vec<f32>) -> Vec<f32> {
    let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

/// Cosine similarity, i.e. `1 - cosine distance`. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

// Embeddings persist as little-endian f32 blobs on the event row.

pub fn to_blob(vec: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn from_blob(blob: &[u8]) -> AppResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(AppError::Internal(format!(
            "Malformed embedding blob of {} bytes",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Produces a fixed-length, L2-normalized vector for arbitrary event or
/// query text. The network client lives behind this seam so tests can
/// substitute a deterministic fake.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>>;
}

/// Hosted feature-extraction client (HuggingFace inference API shape):
/// POST `{"inputs": text, "options": {"wait_for_model": true}}`, one vector
/// per token in the response.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    max_retries: u32,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
        })
    }

    async fn request(&self, text: &str) -> AppResult<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "inputs": text,
                "options": { "wait_for_model": true },
            }))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Embedding request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "Embedding provider returned {}",
                response.status()
            )));
        }

        response
            .json::<Vec<Vec<f32>>>()
            .await
            .map_err(|e| AppError::Upstream(format!("Malformed embedding response: {}", e)))
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        let mut attempt = 0;
        let tokens = loop {
            match self.request(text).await {
                Ok(tokens) => break tokens,
                Err(err) if attempt < self.max_retries => {
                    tracing::warn!("Embedding attempt {} failed, retrying: {}", attempt + 1, err);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        };
        Ok(normalize(mean_pool(&tokens)?))
    }
}

/// Exponential backoff with jitter for upstream retries.
pub(crate) fn retry_backoff(attempt: u32) -> Duration {
    let base = 200u64 * (1 << attempt.min(4));
    let jitter = rand::rng().random_range(0..100);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_averages_elementwise() {
        let tokens = vec![vec![1.0, 2.0, 3.0], vec![3.0, 4.0, 5.0]];
        assert_eq!(mean_pool(&tokens).unwrap(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn mean_pool_rejects_empty_and_ragged_input() {
        assert!(mean_pool(&[]).is_err());
        assert!(mean_pool(&[vec![1.0, 2.0], vec![1.0]]).is_err());
    }

    #[test]
    fn normalized_vectors_have_unit_norm() {
        let v = normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_untouched() {
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn pooling_and_normalization_are_deterministic() {
        let tokens = vec![vec![0.3, -0.2, 0.9], vec![0.1, 0.4, -0.5]];
        let a = normalize(mean_pool(&tokens).unwrap());
        let b = normalize(mean_pool(&tokens).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn cosine_of_vector_with_itself_is_one() {
        let v = normalize(vec![0.2, 0.5, -0.1]);
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_of_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn blob_round_trip_preserves_values() {
        let v = vec![0.25f32, -1.5, 3.125];
        assert_eq!(from_blob(&to_blob(&v)).unwrap(), v);
        assert!(from_blob(&[1, 2, 3]).is_err());
    }
}

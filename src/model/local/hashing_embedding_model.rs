use async_trait::async_trait;
use sha1::{Digest, Sha1};
use unicode_segmentation::UnicodeSegmentation;

use crate::{
    model::EmbeddingModelInference,
    utils::Normalize as _,
    value::Embedding,
};

/// In-process embedding model based on signed feature hashing of word unigrams
/// and bigrams.
///
/// It needs no model files and is fully deterministic, which makes it the
/// default for small knowledge bases and for tests. Similarity is lexical.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingModel {
    dim: usize,
}

impl HashingEmbeddingModel {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    fn bucket(&self, feature: &str) -> (usize, f32) {
        let digest = Sha1::digest(feature.as_bytes());
        let mut idx = [0u8; 8];
        idx.copy_from_slice(&digest[..8]);
        let bucket = (u64::from_le_bytes(idx) % self.dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        (bucket, sign)
    }

    pub fn embed(&self, text: &str) -> Embedding {
        let words = text
            .unicode_words()
            .map(|w| w.to_lowercase())
            .collect::<Vec<_>>();
        let mut values = vec![0.0f32; self.dim];
        for word in words.iter() {
            let (bucket, sign) = self.bucket(word);
            values[bucket] += sign;
        }
        for pair in words.windows(2) {
            let (bucket, sign) = self.bucket(&format!("{} {}", pair[0], pair[1]));
            values[bucket] += 0.5 * sign;
        }
        values.normalized().into()
    }
}

#[async_trait]
impl EmbeddingModelInference for HashingEmbeddingModel {
    async fn infer(&self, text: String) -> anyhow::Result<Embedding> {
        Ok(self.embed(&text))
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::cosine_similarity;

    #[test]
    fn same_text_same_embedding() {
        let model = HashingEmbeddingModel::new(64);
        assert_eq!(model.embed("Chest pain"), model.embed("chest  PAIN"));
        assert_eq!(model.embed("chest pain").dim(), 64);
    }

    #[test]
    fn related_text_scores_higher() {
        let model = HashingEmbeddingModel::new(256);
        let query = model.embed("hypertension blood pressure grading");
        let related = model.embed("Grading of hypertension by blood pressure level");
        let unrelated = model.embed("Postoperative wound care after appendectomy");
        assert!(
            cosine_similarity(query.as_slice(), related.as_slice())
                > cosine_similarity(query.as_slice(), unrelated.as_slice())
        );
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let model = HashingEmbeddingModel::new(8);
        assert!(model.embed("").as_slice().iter().all(|v| *v == 0.0));
    }
}

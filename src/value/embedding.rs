use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

use crate::utils::Normalize as _;

/// A fixed-dimensionality vector representing the semantic content of text.
///
/// Serialized as base64 of little-endian `f32`s to keep index checkpoints compact.
#[derive(Clone, Default, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn normalized(&self) -> Self {
        Self(self.0.normalized())
    }

    fn to_base64(&self) -> String {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for v in self.0.iter() {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn from_base64(s: &str) -> anyhow::Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        if bytes.len() % 4 != 0 {
            anyhow::bail!("embedding byte length {} is not a multiple of 4", bytes.len());
        }
        Ok(Self(
            bytes
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ))
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(value: Vec<f32>) -> Self {
        Self(value)
    }
}

impl std::fmt::Debug for Embedding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const MAX_SHOWN: usize = 4;
        let head = self
            .0
            .iter()
            .take(MAX_SHOWN)
            .map(|v| format!("{:.4}", v))
            .collect::<Vec<_>>()
            .join(", ");
        let tail = if self.0.len() > MAX_SHOWN { ", ..." } else { "" };
        write!(f, "Embedding([{}{}] (dim {}))", head, tail, self.0.len())
    }
}

impl Serialize for Embedding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Embedding {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(de::Error::custom)
    }
}

//! Neural sentence embeddings via fastembed-rs.
//!
//! Catches paraphrases with little lexical overlap ("AC is broken" vs.
//! "air conditioner isn't working"), which the hashing embedder cannot.
//! The model is downloaded once at construction; `embed` is local CPU work.

use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use super::{Fingerprint, TextEmbedder};
use crate::{HermodError, Result};

/// Supported local embedding models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalEmbeddingModel {
    /// all-MiniLM-L6-v2 (384 dims, fast).
    AllMiniLmL6V2,
    /// BGE-small-en v1.5 (384 dims, strong retrieval).
    BgeSmallEn,
}

impl LocalEmbeddingModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            Self::BgeSmallEn => "BGE-small-en",
        }
    }

    pub fn dimensions(&self) -> usize {
        384
    }
}

impl From<LocalEmbeddingModel> for ::fastembed::EmbeddingModel {
    fn from(model: LocalEmbeddingModel) -> Self {
        match model {
            LocalEmbeddingModel::AllMiniLmL6V2 => ::fastembed::EmbeddingModel::AllMiniLML6V2,
            LocalEmbeddingModel::BgeSmallEn => ::fastembed::EmbeddingModel::BGESmallENV15,
        }
    }
}

/// [`TextEmbedder`] backed by a local ONNX sentence-embedding model.
pub struct FastEmbedEmbedder {
    // fastembed needs `&mut` to embed
    model: Mutex<::fastembed::TextEmbedding>,
    kind: LocalEmbeddingModel,
}

impl FastEmbedEmbedder {
    /// Load (downloading if needed) the given model.
    ///
    /// Model files live in `$HERMOD_CACHE_DIR`, defaulting to the user cache
    /// directory.
    pub fn new(kind: LocalEmbeddingModel) -> Result<Self> {
        let cache_dir = std::env::var("HERMOD_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::cache_dir()
                    .unwrap_or_else(|| PathBuf::from(".cache"))
                    .join("hermod")
                    .join("models")
            });

        let options = ::fastembed::InitOptions::new(kind.into())
            .with_show_download_progress(false)
            .with_cache_dir(cache_dir);

        let model = ::fastembed::TextEmbedding::try_new(options).map_err(|e| {
            HermodError::Embedding(format!("failed to load {}: {e}", kind.name()))
        })?;

        Ok(Self {
            model: Mutex::new(model),
            kind,
        })
    }
}

impl TextEmbedder for FastEmbedEmbedder {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn dimensions(&self) -> usize {
        self.kind.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Fingerprint> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        let vectors = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| HermodError::Embedding(e.to_string()))?;
        let values = vectors
            .into_iter()
            .next()
            .ok_or_else(|| HermodError::Embedding("no embedding returned".into()))?;
        Ok(Fingerprint::new(values))
    }
}

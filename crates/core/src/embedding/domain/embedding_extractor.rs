use crate::shared::embedding::Embedding;
use crate::shared::raster::Raster;
use crate::shared::sign_error::SignError;

/// Domain interface for mapping a face crop to an identity embedding.
///
/// Must be deterministic: the same crop always yields the same vector, so a
/// repeated verification reaches the same decision.
pub trait EmbeddingExtractor: Send + Sync {
    fn extract(&self, face: &Raster) -> Result<Embedding, SignError>;

    /// Length of the vectors this extractor produces.
    fn dimension(&self) -> usize;
}

use serde::{Deserialize, Serialize};

use crate::shared::ids::{DocumentId, IdentityId, MatchId, SigningKey};

/// Outcome of comparing one probe against the claimed identity's template.
///
/// Immutable once created; persisted as an audit record whether or not the
/// document ends up signed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub id: MatchId,
    pub document_id: DocumentId,
    pub identity_id: IdentityId,
    pub probe_index: usize,
    /// Cosine similarity in [-1, 1] against the best template embedding.
    pub similarity: f64,
    pub best_template_index: usize,
    pub accepted: bool,
    pub threshold: f64,
    pub recorded_at_ms: u64,
}

impl MatchResult {
    pub fn key(&self) -> SigningKey {
        SigningKey::new(self.document_id, self.identity_id)
    }
}

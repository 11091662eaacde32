use serde::{Deserialize, Serialize};

use crate::shared::ids::{DocumentId, IdentityId, MatchId, SigningKey};

/// The signed state of a document for one signer.
///
/// At most one exists per [`SigningKey`]; it is never updated once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentSignature {
    pub document_id: DocumentId,
    pub identity_id: IdentityId,
    pub signed: bool,
    /// The accepted match that authorized this signature.
    pub match_result_id: MatchId,
    pub confidence: f64,
    pub applied_at_ms: u64,
}

impl DocumentSignature {
    pub fn key(&self) -> SigningKey {
        SigningKey::new(self.document_id, self.identity_id)
    }
}

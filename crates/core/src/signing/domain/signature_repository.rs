use crate::matching::domain::match_result::MatchResult;
use crate::shared::ids::{MatchId, SigningKey};
use crate::shared::sign_error::SignError;
use crate::signing::domain::document_signature::DocumentSignature;

/// Durable record of match results and document signatures.
///
/// Implementations must apply `commit_signature` as one unit: after a crash
/// either the results and the signature are both visible or neither is.
pub trait SignatureRepository: Send + Sync {
    fn find(&self, key: SigningKey) -> Result<Option<DocumentSignature>, SignError>;

    /// Persists the request's match results together with the signature.
    ///
    /// Fails with [`SignError::AlreadySigned`] if the key already has one.
    fn commit_signature(
        &self,
        match_results: &[MatchResult],
        signature: &DocumentSignature,
    ) -> Result<(), SignError>;

    /// Persists match results of a rejected request as audit entries.
    fn record_rejection(&self, match_results: &[MatchResult]) -> Result<(), SignError>;

    /// All results recorded for a key, oldest first.
    fn match_results_for(&self, key: SigningKey) -> Result<Vec<MatchResult>, SignError>;

    fn find_match_result(&self, id: &MatchId) -> Result<Option<MatchResult>, SignError>;
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of an enrolled person, issued by user management.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub u64);

/// Identifier of the document record being signed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub u64);

/// Idempotency key: at most one signature exists per (document, signer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SigningKey {
    pub document_id: DocumentId,
    pub identity_id: IdentityId,
}

impl SigningKey {
    pub fn new(document_id: DocumentId, identity_id: IdentityId) -> Self {
        Self {
            document_id,
            identity_id,
        }
    }
}

/// Identifier of a persisted [`MatchResult`](crate::matching::domain::match_result::MatchResult).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(pub String);

impl MatchId {
    /// `<document>-<identity>-<request>-<probe>`; unique as long as request
    /// ids are.
    pub fn new(key: SigningKey, request_id: &str, probe_index: usize) -> Self {
        Self(format!(
            "{}-{}-{request_id}-{probe_index}",
            key.document_id, key.identity_id
        ))
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "document={} identity={}", self.document_id, self.identity_id)
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

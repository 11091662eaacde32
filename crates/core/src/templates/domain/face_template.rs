use serde::{Deserialize, Serialize};

use crate::shared::clock::now_ms;
use crate::shared::embedding::Embedding;
use crate::shared::ids::IdentityId;
use crate::shared::sign_error::SignError;

/// Enrolled reference embeddings of one identity.
///
/// Never mutated in place: re-enrollment builds a new template and the store
/// swaps it in whole.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceTemplate {
    pub identity_id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub embeddings: Vec<Embedding>,
    pub enrolled_at_ms: u64,
}

impl FaceTemplate {
    pub fn new(
        identity_id: IdentityId,
        display_name: Option<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Self, SignError> {
        let template = Self {
            identity_id,
            display_name,
            embeddings,
            enrolled_at_ms: now_ms(),
        };
        template.validate()?;
        Ok(template)
    }

    /// Non-empty, one dimension, unit vectors.
    pub fn validate(&self) -> Result<(), SignError> {
        let first = self.embeddings.first().ok_or_else(|| {
            SignError::Enrollment(format!(
                "identity {} has no enrollment embeddings",
                self.identity_id
            ))
        })?;
        let dimension = first.dimension();
        for (index, embedding) in self.embeddings.iter().enumerate() {
            if embedding.dimension() != dimension {
                return Err(SignError::Enrollment(format!(
                    "embedding #{index} has {} dimensions, expected {dimension}",
                    embedding.dimension()
                )));
            }
            if !embedding.is_unit() {
                return Err(SignError::Enrollment(format!(
                    "embedding #{index} is not unit length"
                )));
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        self.embeddings.first().map_or(0, Embedding::dimension)
    }
}

use std::sync::Arc;

use crate::shared::embedding::Embedding;
use crate::shared::ids::IdentityId;
use crate::shared::sign_error::SignError;
use crate::templates::domain::face_template::FaceTemplate;

/// Source of enrolled face templates.
///
/// Readers get an `Arc` snapshot: a concurrent re-enrollment never shows
/// them a partially replaced embedding set.
pub trait TemplateStore: Send + Sync {
    /// Fails with [`SignError::IdentityNotEnrolled`] when no template exists.
    fn get_templates(&self, identity_id: IdentityId) -> Result<Arc<FaceTemplate>, SignError>;

    /// Replaces the identity's whole embedding set.
    fn enroll(
        &self,
        identity_id: IdentityId,
        display_name: Option<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Arc<FaceTemplate>, SignError>;

    /// De-enrolls an identity. Returns whether a template existed.
    fn remove(&self, identity_id: IdentityId) -> Result<bool, SignError>;
}

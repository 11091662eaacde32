use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::shared::embedding::Embedding;
use crate::shared::ids::IdentityId;
use crate::shared::sign_error::SignError;
use crate::templates::domain::face_template::FaceTemplate;
use crate::templates::domain::template_store::TemplateStore;

/// Process-local template store with copy-on-write snapshots.
#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<IdentityId, Arc<FaceTemplate>>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swaps a prebuilt template in.
    pub fn insert(&self, template: FaceTemplate) -> Result<Arc<FaceTemplate>, SignError> {
        template.validate()?;
        let template = Arc::new(template);
        self.templates
            .write()
            .map_err(|e| SignError::PersistenceFailure(format!("Lock poisoned: {e}")))?
            .insert(template.identity_id, Arc::clone(&template));
        Ok(template)
    }

    pub fn len(&self) -> usize {
        self.templates.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateStore for InMemoryTemplateStore {
    fn get_templates(&self, identity_id: IdentityId) -> Result<Arc<FaceTemplate>, SignError> {
        self.templates
            .read()
            .map_err(|e| SignError::PersistenceFailure(format!("Lock poisoned: {e}")))?
            .get(&identity_id)
            .cloned()
            .ok_or(SignError::IdentityNotEnrolled(identity_id))
    }

    fn enroll(
        &self,
        identity_id: IdentityId,
        display_name: Option<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Arc<FaceTemplate>, SignError> {
        self.insert(FaceTemplate::new(identity_id, display_name, embeddings)?)
    }

    fn remove(&self, identity_id: IdentityId) -> Result<bool, SignError> {
        Ok(self
            .templates
            .write()
            .map_err(|e| SignError::PersistenceFailure(format!("Lock poisoned: {e}")))?
            .remove(&identity_id)
            .is_some())
    }
}

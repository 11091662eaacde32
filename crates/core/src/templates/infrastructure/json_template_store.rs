use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tempfile::NamedTempFile;

use crate::shared::embedding::Embedding;
use crate::shared::ids::IdentityId;
use crate::shared::sign_error::{persistence_error, SignError};
use crate::templates::domain::face_template::FaceTemplate;
use crate::templates::domain::template_store::TemplateStore;

/// File-backed template store: one `<identity>.json` per enrolled identity.
///
/// Files are replaced by writing a temp file in the same directory and
/// renaming it over the old one, so a crash mid-enrollment leaves either the
/// old or the new set on disk. All templates are loaded at open and served
/// from an in-memory snapshot map.
///
/// The file name is authoritative for the identity. A file that cannot be
/// read, fails validation, or names a different identity inside is skipped at
/// open; lookups for that identity fail with [`SignError::Enrollment`] until
/// it is re-enrolled or removed.
pub struct JsonTemplateStore {
    dir: PathBuf,
    cache: RwLock<Templates>,
}

#[derive(Default)]
struct Templates {
    valid: HashMap<IdentityId, Arc<FaceTemplate>>,
    invalid: HashMap<IdentityId, String>,
}

impl JsonTemplateStore {
    pub fn open(dir: &Path) -> Result<Self, SignError> {
        fs::create_dir_all(dir).map_err(persistence_error)?;

        let mut templates = Templates::default();
        for entry in fs::read_dir(dir).map_err(persistence_error)? {
            let path = entry.map_err(persistence_error)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(identity_id) = identity_from_path(&path) else {
                log::warn!("Ignoring {}: file name is not an identity id", path.display());
                continue;
            };
            match read_template(&path, identity_id) {
                Ok(template) => {
                    templates.valid.insert(identity_id, Arc::new(template));
                }
                Err(err) => {
                    log::warn!("Skipping template {}: {err}", path.display());
                    templates.invalid.insert(identity_id, err.to_string());
                }
            }
        }
        log::debug!(
            "Loaded {} face templates from {} ({} unusable)",
            templates.valid.len(),
            dir.display(),
            templates.invalid.len()
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            cache: RwLock::new(templates),
        })
    }

    fn path_for(&self, identity_id: IdentityId) -> PathBuf {
        self.dir.join(format!("{identity_id}.json"))
    }

    fn write_template(&self, template: &FaceTemplate) -> Result<(), SignError> {
        let mut tmp = NamedTempFile::new_in(&self.dir).map_err(persistence_error)?;
        serde_json::to_writer_pretty(tmp.as_file_mut(), template).map_err(persistence_error)?;
        tmp.as_file_mut().flush().map_err(persistence_error)?;
        tmp.as_file().sync_all().map_err(persistence_error)?;
        tmp.persist(self.path_for(template.identity_id))
            .map_err(|e| persistence_error(e.error))?;
        Ok(())
    }
}

fn identity_from_path(path: &Path) -> Option<IdentityId> {
    path.file_stem()?.to_str()?.parse().ok().map(IdentityId)
}

fn read_template(path: &Path, identity_id: IdentityId) -> Result<FaceTemplate, SignError> {
    let json = fs::read_to_string(path).map_err(persistence_error)?;
    let template: FaceTemplate = serde_json::from_str(&json)
        .map_err(|e| SignError::Enrollment(format!("unreadable template: {e}")))?;
    if template.identity_id != identity_id {
        return Err(SignError::Enrollment(format!(
            "file holds the template of identity {}",
            template.identity_id
        )));
    }
    template.validate()?;
    Ok(template)
}

fn poisoned(e: impl std::fmt::Display) -> SignError {
    SignError::PersistenceFailure(format!("Lock poisoned: {e}"))
}

impl TemplateStore for JsonTemplateStore {
    fn get_templates(&self, identity_id: IdentityId) -> Result<Arc<FaceTemplate>, SignError> {
        let cache = self.cache.read().map_err(poisoned)?;
        if let Some(template) = cache.valid.get(&identity_id) {
            return Ok(Arc::clone(template));
        }
        match cache.invalid.get(&identity_id) {
            Some(problem) => Err(SignError::Enrollment(format!(
                "stored template for identity {identity_id} is unusable: {problem}"
            ))),
            None => Err(SignError::IdentityNotEnrolled(identity_id)),
        }
    }

    fn enroll(
        &self,
        identity_id: IdentityId,
        display_name: Option<String>,
        embeddings: Vec<Embedding>,
    ) -> Result<Arc<FaceTemplate>, SignError> {
        let template = Arc::new(FaceTemplate::new(identity_id, display_name, embeddings)?);
        let mut cache = self.cache.write().map_err(poisoned)?;
        self.write_template(&template)?;
        cache.invalid.remove(&identity_id);
        cache.valid.insert(identity_id, Arc::clone(&template));
        log::info!(
            "Enrolled identity {identity_id} with {} embeddings",
            template.embeddings.len()
        );
        Ok(template)
    }

    fn remove(&self, identity_id: IdentityId) -> Result<bool, SignError> {
        let mut cache = self.cache.write().map_err(poisoned)?;
        let path = self.path_for(identity_id);
        if path.exists() {
            fs::remove_file(&path).map_err(persistence_error)?;
        }
        let had_invalid = cache.invalid.remove(&identity_id).is_some();
        Ok(cache.valid.remove(&identity_id).is_some() || had_invalid)
    }
}

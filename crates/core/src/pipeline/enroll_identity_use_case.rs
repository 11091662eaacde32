use std::sync::Arc;

use crate::pipeline::face_embedder::FaceEmbedder;
use crate::shared::ids::IdentityId;
use crate::shared::probe_image::ProbeImage;
use crate::shared::sign_error::SignError;
use crate::templates::domain::face_template::FaceTemplate;
use crate::templates::domain::template_store::TemplateStore;

/// Builds a template from enrollment photos and replaces the identity's
/// stored set. Any unusable photo aborts the enrollment.
pub struct EnrollIdentityUseCase {
    embedder: Arc<FaceEmbedder>,
    templates: Arc<dyn TemplateStore>,
}

impl EnrollIdentityUseCase {
    pub fn new(embedder: Arc<FaceEmbedder>, templates: Arc<dyn TemplateStore>) -> Self {
        Self {
            embedder,
            templates,
        }
    }

    pub fn execute(
        &self,
        identity_id: IdentityId,
        display_name: Option<String>,
        photos: &[ProbeImage],
    ) -> Result<Arc<FaceTemplate>, SignError> {
        if photos.is_empty() {
            return Err(SignError::Enrollment("no enrollment photos".into()));
        }
        let embeddings = photos
            .iter()
            .enumerate()
            .map(|(i, photo)| self.embedder.embed(photo, i))
            .collect::<Result<Vec<_>, _>>()?;
        self.templates.enroll(identity_id, display_name, embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_selector::FaceSelector;
    use crate::pipeline::face_embedder::fixtures::{png_probe, FixedDetector, MeanColorExtractor};
    use crate::shared::region::FaceRegion;
    use crate::templates::infrastructure::in_memory_template_store::InMemoryTemplateStore;

    fn use_case(regions: Vec<FaceRegion>) -> (EnrollIdentityUseCase, Arc<InMemoryTemplateStore>) {
        let store = Arc::new(InMemoryTemplateStore::new());
        let embedder = Arc::new(FaceEmbedder::new(
            Arc::new(FixedDetector(regions)),
            Arc::new(MeanColorExtractor),
            FaceSelector::new(0.5, 0.1),
            32,
        ));
        (EnrollIdentityUseCase::new(embedder, store.clone()), store)
    }

    #[test]
    fn test_enrolls_one_embedding_per_photo() {
        let (enroll, store) = use_case(vec![FaceRegion::new(0, 0, 64, 64, 0.9)]);
        let photos = vec![png_probe(64, 64, [0, 60, 80]), png_probe(64, 64, [0, 80, 60])];
        enroll.execute(IdentityId(42), Some("Ada".into()), &photos).unwrap();

        let template = store.get_templates(IdentityId(42)).unwrap();
        assert_eq!(template.embeddings.len(), 2);
        assert_eq!(template.dimension(), 3);
    }

    #[test]
    fn test_faceless_photo_aborts_enrollment() {
        let (enroll, store) = use_case(vec![]);
        let err = enroll
            .execute(IdentityId(42), None, &[png_probe(64, 64, [0, 60, 80])])
            .unwrap_err();
        assert_eq!(err, SignError::NoFaceDetected { probe_index: 0 });
        assert!(store.is_empty());
    }

    #[test]
    fn test_no_photos_is_rejected() {
        let (enroll, _store) = use_case(vec![]);
        let err = enroll.execute(IdentityId(42), None, &[]).unwrap_err();
        assert!(matches!(err, SignError::Enrollment(_)));
    }
}

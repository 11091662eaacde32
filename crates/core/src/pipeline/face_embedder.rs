use std::sync::Arc;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_selector::FaceSelector;
use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::embedding::domain::face_crop::prepare_face_crop;
use crate::shared::embedding::Embedding;
use crate::shared::probe_image::ProbeImage;
use crate::shared::raster::Raster;
use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// Image → single face → embedding, shared by enrollment and signing.
pub struct FaceEmbedder {
    detector: Arc<dyn FaceDetector>,
    extractor: Arc<dyn EmbeddingExtractor>,
    selector: FaceSelector,
    min_face_size: u32,
}

impl FaceEmbedder {
    pub fn new(
        detector: Arc<dyn FaceDetector>,
        extractor: Arc<dyn EmbeddingExtractor>,
        selector: FaceSelector,
        min_face_size: u32,
    ) -> Self {
        Self {
            detector,
            extractor,
            selector,
            min_face_size,
        }
    }

    pub fn dimension(&self) -> usize {
        self.extractor.dimension()
    }

    /// Detects faces and applies the selection policy.
    pub fn locate(&self, raster: &Raster, probe_index: usize) -> Result<FaceRegion, SignError> {
        let regions = self.detector.detect(raster)?;
        log::debug!("Probe #{probe_index}: {} face candidates", regions.len());
        self.selector.select(&regions, probe_index)
    }

    /// Crops the selected face and extracts its embedding.
    pub fn extract(&self, raster: &Raster, region: &FaceRegion) -> Result<Embedding, SignError> {
        let crop = prepare_face_crop(raster, region, self.min_face_size)?;
        let embedding = self.extractor.extract(&crop)?;
        if embedding.dimension() != self.extractor.dimension() {
            return Err(SignError::ExtractionFailed(format!(
                "extractor returned {} dimensions, expected {}",
                embedding.dimension(),
                self.extractor.dimension()
            )));
        }
        Ok(embedding)
    }

    pub fn embed(&self, probe: &ProbeImage, probe_index: usize) -> Result<Embedding, SignError> {
        let raster = probe.decode()?;
        let region = self.locate(&raster, probe_index)?;
        self.extract(&raster, &region)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};

    use crate::detection::domain::face_detector::FaceDetector;
    use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
    use crate::shared::embedding::Embedding;
    use crate::shared::probe_image::ProbeImage;
    use crate::shared::raster::Raster;
    use crate::shared::region::FaceRegion;
    use crate::shared::sign_error::SignError;

    /// Encodes a solid-color PNG probe.
    pub(crate) fn png_probe(width: u32, height: u32, color: [u8; 3]) -> ProbeImage {
        let img = RgbImage::from_pixel(width, height, Rgb(color));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ProbeImage::new(bytes, "image/png")
    }

    /// Returns fixed regions for every raster.
    pub(crate) struct FixedDetector(pub Vec<FaceRegion>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _raster: &Raster) -> Result<Vec<FaceRegion>, SignError> {
            Ok(self.0.clone())
        }
    }

    /// Embeds a crop as its mean color, so probes are steered by pixel color.
    pub(crate) struct MeanColorExtractor;

    impl EmbeddingExtractor for MeanColorExtractor {
        fn extract(&self, face: &Raster) -> Result<Embedding, SignError> {
            let mut sums = [0f32; 3];
            for y in 0..face.height() {
                for x in 0..face.width() {
                    let rgb = face.rgb_at(x, y);
                    for c in 0..3 {
                        sums[c] += rgb[c] as f32;
                    }
                }
            }
            Embedding::normalized(sums.to_vec())
        }

        fn dimension(&self) -> usize {
            3
        }
    }
}

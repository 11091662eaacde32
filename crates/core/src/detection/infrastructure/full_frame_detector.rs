use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::raster::Raster;
use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// Reports the whole image as one face with full confidence.
///
/// For capture flows that already deliver a tightly cropped portrait (ID
/// photo booths, kiosk cameras with a face guide), where running a detector
/// would only add latency.
#[derive(Clone, Copy, Debug, Default)]
pub struct FullFrameDetector;

impl FaceDetector for FullFrameDetector {
    fn detect(&self, raster: &Raster) -> Result<Vec<FaceRegion>, SignError> {
        Ok(vec![FaceRegion::new(
            0,
            0,
            raster.width() as i32,
            raster.height() as i32,
            1.0,
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_returns_single_full_region() {
        let raster = Raster::try_new(vec![0u8; 40 * 30 * 3], 40, 30, 3).unwrap();
        let regions = FullFrameDetector.detect(&raster).unwrap();
        assert_eq!(regions, vec![FaceRegion::new(0, 0, 40, 30, 1.0)]);
    }
}

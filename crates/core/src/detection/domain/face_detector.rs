use crate::shared::raster::Raster;
use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// Domain interface for face detection.
///
/// Implementations are pure with respect to the input raster and are
/// shared across concurrent sign requests, hence `&self` and `Sync`.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, raster: &Raster) -> Result<Vec<FaceRegion>, SignError>;
}

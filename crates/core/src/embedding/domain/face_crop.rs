use crate::shared::raster::Raster;
use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// Cuts the square face crop an extractor is fed.
///
/// Fails with [`SignError::ExtractionFailed`] when the visible crop's
/// shorter side is below `min_face_size` pixels.
pub fn prepare_face_crop(
    raster: &Raster,
    region: &FaceRegion,
    min_face_size: u32,
) -> Result<Raster, SignError> {
    let crop = raster.crop(&region.squared())?;
    let side = crop.width().min(crop.height());
    if side < min_face_size {
        return Err(SignError::ExtractionFailed(format!(
            "face crop {}x{} is below the {min_face_size}px minimum",
            crop.width(),
            crop.height()
        )));
    }
    Ok(crop)
}

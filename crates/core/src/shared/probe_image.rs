use std::path::Path;

use image::ImageFormat;

use crate::shared::constants::SUPPORTED_MIME_TYPES;
use crate::shared::raster::Raster;
use crate::shared::sign_error::SignError;

/// An uploaded face photo: raw bytes plus the declared content type.
///
/// Lives only for the duration of one request and is never persisted.
#[derive(Clone)]
pub struct ProbeImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl ProbeImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Reads a file, inferring the content type from its extension.
    pub fn from_path(path: &Path) -> Result<Self, SignError> {
        let format = ImageFormat::from_path(path).map_err(|e| {
            SignError::InvalidImage(format!("{}: {e}", path.display()))
        })?;
        let bytes = std::fs::read(path)
            .map_err(|e| SignError::InvalidImage(format!("{}: {e}", path.display())))?;
        Ok(Self::new(bytes, format.to_mime_type()))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Decodes to an RGB raster using the declared content type.
    ///
    /// The declared type must be supported and must match the payload; a
    /// PNG labelled `image/jpeg` is rejected rather than sniffed.
    pub fn decode(&self) -> Result<Raster, SignError> {
        let mime = self.mime_type.to_ascii_lowercase();
        if !SUPPORTED_MIME_TYPES.contains(&mime.as_str()) {
            return Err(SignError::InvalidImage(format!(
                "unsupported content type '{}'",
                self.mime_type
            )));
        }
        if self.bytes.is_empty() {
            return Err(SignError::InvalidImage("empty image payload".into()));
        }
        let format = ImageFormat::from_mime_type(&mime).ok_or_else(|| {
            SignError::InvalidImage(format!("unsupported content type '{}'", self.mime_type))
        })?;

        let decoded = image::load_from_memory_with_format(&self.bytes, format)
            .map_err(|e| SignError::InvalidImage(format!("failed to decode {mime}: {e}")))?;
        let rgb = decoded.to_rgb8();
        let (width, height) = rgb.dimensions();
        Raster::try_new(rgb.into_raw(), width, height, 3)
    }
}

impl std::fmt::Debug for ProbeImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn png_bytes(w: u32, h: u32, rgb: [u8; 3]) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(w, h, image::Rgb(rgb));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_decode_png() {
        let probe = ProbeImage::new(png_bytes(8, 6, [10, 20, 30]), "image/png");
        let raster = probe.decode().unwrap();
        assert_eq!((raster.width(), raster.height(), raster.channels()), (8, 6, 3));
        assert_eq!(raster.rgb_at(7, 5), [10, 20, 30]);
    }

    #[test]
    fn test_mime_is_case_insensitive() {
        let probe = ProbeImage::new(png_bytes(2, 2, [0, 0, 0]), "IMAGE/PNG");
        assert!(probe.decode().is_ok());
    }

    #[test]
    fn test_unsupported_mime_is_invalid_image() {
        let probe = ProbeImage::new(png_bytes(2, 2, [0, 0, 0]), "application/pdf");
        assert!(matches!(probe.decode(), Err(SignError::InvalidImage(_))));
    }

    #[test]
    fn test_garbage_bytes_are_invalid_image() {
        let probe = ProbeImage::new(vec![1, 2, 3, 4, 5], "image/jpeg");
        assert!(matches!(probe.decode(), Err(SignError::InvalidImage(_))));
    }

    #[test]
    fn test_empty_payload_is_invalid_image() {
        let probe = ProbeImage::new(Vec::new(), "image/png");
        assert!(matches!(probe.decode(), Err(SignError::InvalidImage(_))));
    }

    #[test]
    fn test_mislabelled_payload_is_rejected() {
        let probe = ProbeImage::new(png_bytes(2, 2, [0, 0, 0]), "image/jpeg");
        assert!(probe.decode().is_err());
    }

    #[test]
    fn test_from_path_infers_mime() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("face.png");
        std::fs::write(&path, png_bytes(4, 4, [1, 2, 3])).unwrap();
        let probe = ProbeImage::from_path(&path).unwrap();
        assert_eq!(probe.mime_type(), "image/png");
        assert!(probe.decode().is_ok());
    }
}

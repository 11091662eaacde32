use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// A decoded image: contiguous interleaved bytes in row-major order.
///
/// Decoding happens at the probe boundary only; detectors and extractors
/// see validated rasters.
#[derive(Clone, Debug, PartialEq)]
pub struct Raster {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
}

impl Raster {
    /// Validates dimensions against the buffer. Zero-size or mismatched
    /// input fails with [`SignError::InvalidImage`].
    pub fn try_new(data: Vec<u8>, width: u32, height: u32, channels: u8) -> Result<Self, SignError> {
        if width == 0 || height == 0 {
            return Err(SignError::InvalidImage(format!(
                "zero-size raster {width}x{height}"
            )));
        }
        if !matches!(channels, 1 | 3 | 4) {
            return Err(SignError::InvalidImage(format!(
                "unsupported channel count {channels}"
            )));
        }
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if data.len() != expected {
            return Err(SignError::InvalidImage(format!(
                "buffer holds {} bytes, {width}x{height}x{channels} needs {expected}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            channels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    /// RGB triple at `(x, y)`; grayscale is replicated, alpha ignored.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let c = self.channels as usize;
        let offset = ((y as usize) * (self.width as usize) + x as usize) * c;
        if c == 1 {
            let v = self.data[offset];
            [v, v, v]
        } else {
            [
                self.data[offset],
                self.data[offset + 1],
                self.data[offset + 2],
            ]
        }
    }

    /// Copies the pixels under `region` (clamped to the raster) into a new
    /// RGB raster.
    pub fn crop(&self, region: &FaceRegion) -> Result<Raster, SignError> {
        let clamped = region.clamp_to(self.width, self.height).ok_or_else(|| {
            SignError::ExtractionFailed(format!(
                "face region {region:?} lies outside the {}x{} image",
                self.width, self.height
            ))
        })?;

        let mut out = Vec::with_capacity((clamped.width * clamped.height * 3) as usize);
        for y in clamped.y..clamped.y + clamped.height {
            for x in clamped.x..clamped.x + clamped.width {
                out.extend_from_slice(&self.rgb_at(x, y));
            }
        }
        Raster::try_new(out, clamped.width, clamped.height, 3)
    }
}

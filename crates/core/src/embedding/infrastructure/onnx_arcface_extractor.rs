/// ArcFace embedding extractor using ONNX Runtime.
///
/// Produces 512-D identity embeddings from face crops. The session is not
/// reentrant, so concurrent requests serialize on it.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::shared::embedding::Embedding;
use crate::shared::raster::Raster;
use crate::shared::sign_error::{inference_error, SignError};

pub const EMBEDDING_DIMENSION: usize = 512;

const INPUT_SIZE: usize = 112;
const NORM_MEAN: f32 = 127.5;
const NORM_STD: f32 = 127.5;

pub struct OnnxArcFaceExtractor {
    session: Mutex<ort::session::Session>,
}

impl OnnxArcFaceExtractor {
    pub fn new(model_path: &Path) -> Result<Self, SignError> {
        let intra_threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session = ort::session::Session::builder()
            .map_err(inference_error)?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
            .map_err(inference_error)?
            .with_inter_threads(1)
            .map_err(inference_error)?
            .with_intra_threads(intra_threads)
            .map_err(inference_error)?
            .with_execution_providers(preferred_execution_providers())
            .map_err(inference_error)?
            .commit_from_file(model_path)
            .map_err(inference_error)?;
        log::debug!("Loaded ArcFace extractor {}", model_path.display());
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl EmbeddingExtractor for OnnxArcFaceExtractor {
    fn extract(&self, face: &Raster) -> Result<Embedding, SignError> {
        let tensor = preprocess(face);
        let input_value = ort::value::Tensor::from_array(tensor).map_err(inference_error)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| SignError::Inference(format!("Lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(inference_error)?;
        if outputs.len() == 0 {
            return Err(SignError::Inference("ArcFace model produced no outputs".into()));
        }
        let embedding_array = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;
        let embedding_slice = embedding_array
            .as_slice()
            .ok_or_else(|| SignError::Inference("Cannot get embedding slice".into()))?;
        to_embedding(embedding_slice)
    }

    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }
}

fn to_embedding(values: &[f32]) -> Result<Embedding, SignError> {
    if values.len() != EMBEDDING_DIMENSION {
        return Err(SignError::ExtractionFailed(format!(
            "model returned {} values, expected {EMBEDDING_DIMENSION}",
            values.len()
        )));
    }
    Embedding::normalized(values.to_vec())
}

/// Resize crop to 112x112, normalize, NCHW layout.
fn preprocess(face: &Raster) -> ndarray::Array4<f32> {
    let src_w = face.width() as usize;
    let src_h = face.height() as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, INPUT_SIZE, INPUT_SIZE));

    for y in 0..INPUT_SIZE {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / INPUT_SIZE as f64) as usize).min(src_h - 1);
        for x in 0..INPUT_SIZE {
            let src_x =
                (((x as f64 + 0.5) * src_w as f64 / INPUT_SIZE as f64) as usize).min(src_w - 1);
            let rgb = face.rgb_at(src_x as u32, src_y as u32);
            for c in 0..3 {
                tensor[[0, c, y, x]] = (rgb[c] as f32 - NORM_MEAN) / NORM_STD;
            }
        }
    }

    tensor
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn solid(w: u32, h: u32, value: u8) -> Raster {
        Raster::try_new(vec![value; (w * h * 3) as usize], w, h, 3).unwrap()
    }

    #[test]
    fn test_preprocess_shape() {
        let tensor = preprocess(&solid(50, 50, 128));
        assert_eq!(tensor.shape(), &[1, 3, 112, 112]);
    }

    #[test]
    fn test_preprocess_normalization() {
        let tensor = preprocess(&solid(10, 10, 127));
        assert_relative_eq!(tensor[[0, 0, 0, 0]], (127.0 - 127.5) / 127.5, epsilon = 0.01);
    }

    #[test]
    fn test_preprocess_normalization_bounds() {
        assert_relative_eq!(preprocess(&solid(10, 10, 255))[[0, 0, 0, 0]], 1.0, epsilon = 0.01);
        assert_relative_eq!(preprocess(&solid(10, 10, 0))[[0, 2, 5, 5]], -1.0, epsilon = 0.01);
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let mut data = Vec::new();
        for i in 0..(37 * 41) {
            data.extend_from_slice(&[(i % 251) as u8, (i % 13) as u8, (i % 7) as u8]);
        }
        let face = Raster::try_new(data, 37, 41, 3).unwrap();
        assert_eq!(preprocess(&face), preprocess(&face));
    }

    #[test]
    fn test_output_of_wrong_length_is_rejected() {
        let err = to_embedding(&[0.5; 128]).unwrap_err();
        assert!(matches!(err, SignError::ExtractionFailed(_)));
        assert!(matches!(to_embedding(&[]), Err(SignError::ExtractionFailed(_))));
    }

    #[test]
    fn test_output_is_normalized() {
        let emb = to_embedding(&[2.0; EMBEDDING_DIMENSION]).unwrap();
        assert!(emb.is_unit());
        assert_eq!(emb.dimension(), EMBEDDING_DIMENSION);
    }
}

/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS post-processing.
/// Boxes are mapped back to source pixels and clamped to the image.
use std::path::Path;
use std::sync::Mutex;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::execution_provider::preferred_execution_providers;
use crate::shared::raster::Raster;
use crate::shared::region::FaceRegion;
use crate::shared::sign_error::{inference_error, SignError};

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO face detector backed by an ONNX Runtime session.
pub struct OnnxYoloDetector {
    session: Mutex<ort::session::Session>,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Load a YOLO ONNX model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, SignError> {
        let session = ort::session::Session::builder()
            .map_err(inference_error)?
            .with_execution_providers(preferred_execution_providers())
            .map_err(inference_error)?
            .commit_from_file(model_path)
            .map_err(inference_error)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // [N, C, H, W]; square input, so H is enough
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "Loaded YOLO detector {} (input {input_size}px)",
            model_path.display()
        );

        Ok(Self {
            session: Mutex::new(session),
            confidence,
            input_size,
        })
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&self, raster: &Raster) -> Result<Vec<FaceRegion>, SignError> {
        let (input_tensor, letterbox) = letterbox(raster, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor).map_err(inference_error)?;
        let mut session = self
            .session
            .lock()
            .map_err(|e| SignError::Inference(format!("Lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(inference_error)?;
        if outputs.len() == 0 {
            return Err(SignError::Inference("YOLO model produced no outputs".into()));
        }
        let tensor = outputs[0]
            .try_extract_array::<f32>()
            .map_err(inference_error)?;
        let shape = tensor.shape().to_vec();
        let data = tensor
            .as_slice()
            .ok_or_else(|| SignError::Inference("Cannot get tensor slice".into()))?;

        let mut raw = parse_detections(data, &shape, self.confidence, &letterbox)?;
        let kept = nms(&mut raw, NMS_IOU_THRESH);

        Ok(kept
            .into_iter()
            .filter_map(|d| {
                let region = FaceRegion::from_corners(d.x1, d.y1, d.x2, d.y2, d.confidence);
                let rect = region.clamp_to(raster.width(), raster.height())?;
                Some(FaceRegion::new(
                    rect.x as i32,
                    rect.y as i32,
                    rect.width as i32,
                    rect.height as i32,
                    d.confidence,
                ))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
}

/// Letterbox-resize a raster to `target_size` × `target_size`.
fn letterbox(raster: &Raster, target_size: u32) -> (ndarray::Array4<f32>, Letterbox) {
    let fw = raster.width() as f64;
    let fh = raster.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src_h = raster.height();
    let src_w = raster.width();

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as u32).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as u32).min(src_w - 1);
            let rgb = raster.rgb_at(src_x, src_y);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = rgb[c] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

/// Decodes `[1, features, detections]` or `[1, detections, features]` output
/// rows of `[cx, cy, w, h, conf, ...]` into source-image boxes.
fn parse_detections(
    data: &[f32],
    shape: &[usize],
    min_confidence: f64,
    lb: &Letterbox,
) -> Result<Vec<RawDetection>, SignError> {
    if shape.len() != 3 {
        return Err(SignError::Inference(format!(
            "Unexpected YOLO output shape: {shape:?}"
        )));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 || data.len() < num_dets * num_feats {
        return Err(SignError::Inference(format!(
            "YOLO output too small for shape {shape:?}"
        )));
    }

    let value = |det: usize, feat: usize| -> f64 {
        if transposed {
            data[feat * num_dets + det] as f64
        } else {
            data[det * num_feats + feat] as f64
        }
    };

    let mut dets = Vec::new();
    for i in 0..num_dets {
        let conf = value(i, 4);
        if conf < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(i, 0), value(i, 1), value(i, 2), value(i, 3));
        dets.push(RawDetection {
            x1: ((cx - w / 2.0) - lb.pad_x as f64) / lb.scale,
            y1: ((cy - h / 2.0) - lb.pad_y as f64) / lb.scale,
            x2: ((cx + w / 2.0) - lb.pad_x as f64) / lb.scale,
            y2: ((cy + h / 2.0) - lb.pad_y as f64) / lb.scale,
            confidence: conf,
        });
    }
    Ok(dets)
}

/// Greedy NMS: sort by confidence descending, suppress overlapping boxes.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        let suppressed = keep.iter().any(|k| bbox_iou(k, det) > iou_thresh);
        if !suppressed {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &RawDetection, b: &RawDetection) -> f64 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(w: u32, h: u32, value: u8) -> Raster {
        Raster::try_new(vec![value; (w * h * 3) as usize], w, h, 3).unwrap()
    }

    fn det(x1: f64, y1: f64, x2: f64, y2: f64, confidence: f64) -> RawDetection {
        RawDetection {
            x1,
            y1,
            x2,
            y2,
            confidence,
        }
    }

    #[test]
    fn test_letterbox_preserves_aspect_ratio() {
        // 200x100 → 640: scale 3.2, 640x320 content, 160px vertical padding
        let (tensor, lb) = letterbox(&raster(200, 100, 128), 640);

        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert!((lb.scale - 3.2).abs() < 0.01);
        assert_eq!(lb.pad_x, 0);
        assert_eq!(lb.pad_y, 160);
    }

    #[test]
    fn test_letterbox_values_normalized() {
        let (tensor, lb) = letterbox(&raster(100, 50, 255), 640);
        assert!(lb.pad_y > 0);

        let y = lb.pad_y as usize + 1;
        assert!((tensor[[0, 0, y, 1]] - 1.0).abs() < 0.01);
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 0.01);
    }

    #[test]
    fn test_parse_detections_row_major() {
        // [1, 6 detections, 5 features], letterbox identity
        let mut data = vec![0.0f32; 6 * 5];
        data[..5].copy_from_slice(&[50.0, 50.0, 20.0, 20.0, 0.9]);
        data[5..10].copy_from_slice(&[10.0, 10.0, 4.0, 4.0, 0.1]);
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        let dets = parse_detections(&data, &[1, 6, 5], 0.5, &lb).unwrap();
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x1 - 40.0).abs() < 1e-9);
        assert!((dets[0].y2 - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_detections_transposed_with_letterbox() {
        // [1, 5 features, 6 detections]; only detection 0 is confident
        let mut data = vec![0.0f32; 5 * 6];
        data[0] = 100.0; // cx
        data[6] = 180.0; // cy
        data[12] = 40.0; // w
        data[18] = 40.0; // h
        data[24] = 0.8; // conf
        let lb = Letterbox {
            scale: 2.0,
            pad_x: 0,
            pad_y: 80,
        };
        let dets = parse_detections(&data, &[1, 5, 6], 0.5, &lb).unwrap();
        assert_eq!(dets.len(), 1);
        assert!((dets[0].x1 - 40.0).abs() < 1e-9);
        assert!((dets[0].y1 - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_detections_bad_shape() {
        let lb = Letterbox {
            scale: 1.0,
            pad_x: 0,
            pad_y: 0,
        };
        assert!(parse_detections(&[0.0; 4], &[4], 0.5, &lb).is_err());
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.9),
            det(5.0, 5.0, 105.0, 105.0, 0.8),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_keeps_non_overlapping() {
        let mut dets = vec![
            det(0.0, 0.0, 50.0, 50.0, 0.9),
            det(200.0, 200.0, 250.0, 250.0, 0.8),
        ];
        assert_eq!(nms(&mut dets, 0.3).len(), 2);
    }

    #[test]
    fn test_nms_confidence_ordering() {
        let mut dets = vec![
            det(0.0, 0.0, 100.0, 100.0, 0.5),
            det(2.0, 2.0, 102.0, 102.0, 0.9),
        ];
        let kept = nms(&mut dets, 0.3);
        assert_eq!(kept.len(), 1);
        assert!((kept[0].confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nms_empty_input() {
        let mut dets: Vec<RawDetection> = Vec::new();
        assert!(nms(&mut dets, 0.3).is_empty());
    }
}

/// HSV histogram embedding extractor.
///
/// A model-free fallback that describes a face crop by its 2D
/// hue/saturation distribution. The histogram is mean-centred before
/// normalization, so the dot product of two embeddings equals the Pearson
/// correlation of their histograms. Far weaker than ArcFace; meant for
/// controlled capture setups and tests, not open-world verification.
use crate::embedding::domain::embedding_extractor::EmbeddingExtractor;
use crate::shared::embedding::Embedding;
use crate::shared::raster::Raster;
use crate::shared::sign_error::SignError;

const HUE_BINS: usize = 32;
const SAT_BINS: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
pub struct HistogramEmbeddingExtractor;

impl EmbeddingExtractor for HistogramEmbeddingExtractor {
    fn extract(&self, face: &Raster) -> Result<Embedding, SignError> {
        let mut hist = compute_histogram(face);
        let mean = hist.iter().sum::<f64>() / hist.len() as f64;
        for v in &mut hist {
            *v -= mean;
        }
        Embedding::normalized(hist.into_iter().map(|v| v as f32).collect()).map_err(|_| {
            SignError::ExtractionFailed(
                "face crop has a flat color histogram; nothing to compare".into(),
            )
        })
    }

    fn dimension(&self) -> usize {
        HUE_BINS * SAT_BINS
    }
}

fn compute_histogram(face: &Raster) -> Vec<f64> {
    let mut hist = vec![0.0f64; HUE_BINS * SAT_BINS];
    let mut count = 0usize;

    for y in 0..face.height() {
        for x in 0..face.width() {
            let [r, g, b] = face.rgb_at(x, y);
            let (h, s, _v) = rgb_to_hsv(r as f64 / 255.0, g as f64 / 255.0, b as f64 / 255.0);

            let h_bin = ((h / 360.0) * HUE_BINS as f64).min(HUE_BINS as f64 - 1.0) as usize;
            let s_bin = (s * SAT_BINS as f64).min(SAT_BINS as f64 - 1.0) as usize;

            hist[h_bin * SAT_BINS + s_bin] += 1.0;
            count += 1;
        }
    }

    if count > 0 {
        let total = count as f64;
        for v in &mut hist {
            *v /= total;
        }
    }

    hist
}

fn rgb_to_hsv(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let v = max;
    let s = if max > 0.0 { delta / max } else { 0.0 };

    let h = if delta == 0.0 {
        0.0
    } else if (max - r).abs() < f64::EPSILON {
        60.0 * (((g - b) / delta) % 6.0)
    } else if (max - g).abs() < f64::EPSILON {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let h = if h < 0.0 { h + 360.0 } else { h };

    (h, s, v)
}

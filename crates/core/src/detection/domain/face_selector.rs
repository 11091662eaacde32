use crate::shared::region::FaceRegion;
use crate::shared::sign_error::SignError;

/// Picks the single face a probe image is judged on.
///
/// Near-tied detections are refused rather than resolved: silently picking
/// one of two similar faces is how a bystander's face ends up signing.
#[derive(Clone, Copy, Debug)]
pub struct FaceSelector {
    min_confidence: f64,
    ambiguity_margin: f64,
}

impl FaceSelector {
    pub fn new(min_confidence: f64, ambiguity_margin: f64) -> Self {
        Self {
            min_confidence,
            ambiguity_margin,
        }
    }

    pub fn select(
        &self,
        regions: &[FaceRegion],
        probe_index: usize,
    ) -> Result<FaceRegion, SignError> {
        let mut candidates: Vec<&FaceRegion> = regions
            .iter()
            .filter(|r| r.confidence >= self.min_confidence && r.area() > 0)
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        match candidates.as_slice() {
            [] => Err(SignError::NoFaceDetected { probe_index }),
            [best] => Ok((*best).clone()),
            [best, runner_up, ..] => {
                if best.confidence - runner_up.confidence < self.ambiguity_margin {
                    Err(SignError::AmbiguousFace {
                        probe_index,
                        best: best.confidence,
                        runner_up: runner_up.confidence,
                    })
                } else {
                    Ok((*best).clone())
                }
            }
        }
    }
}

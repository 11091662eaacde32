use crate::matching::domain::match_result::MatchResult;
use crate::shared::clock::now_ms;
use crate::shared::embedding::Embedding;
use crate::shared::ids::{MatchId, SigningKey};
use crate::shared::sign_error::SignError;
use crate::templates::domain::face_template::FaceTemplate;

/// Best-of-N comparison of a probe against a template's embeddings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchScore {
    pub similarity: f64,
    pub best_template_index: usize,
    pub accepted: bool,
}

/// Compares `probe` against every template embedding and keeps the maximum.
///
/// The probe is accepted when the best similarity reaches `threshold`.
/// Ties resolve to the lowest template index.
pub fn match_embeddings(
    probe: &Embedding,
    template: &FaceTemplate,
    threshold: f64,
) -> Result<MatchScore, SignError> {
    let mut best: Option<(usize, f64)> = None;

    for (index, candidate) in template.embeddings.iter().enumerate() {
        if candidate.dimension() != probe.dimension() {
            return Err(SignError::ExtractionFailed(format!(
                "probe has {} dimensions, template #{index} has {}",
                probe.dimension(),
                candidate.dimension()
            )));
        }
        let similarity = probe.similarity(candidate);
        if best.map_or(true, |(_, s)| similarity > s) {
            best = Some((index, similarity));
        }
    }

    let (best_template_index, similarity) =
        best.ok_or(SignError::IdentityNotEnrolled(template.identity_id))?;

    Ok(MatchScore {
        similarity,
        best_template_index,
        accepted: similarity >= threshold,
    })
}

/// Turns match scores into [`MatchResult`] records for one request.
#[derive(Clone, Copy, Debug)]
pub struct Matcher {
    threshold: f64,
}

impl Matcher {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn evaluate(
        &self,
        key: SigningKey,
        request_id: &str,
        probe_index: usize,
        probe: &Embedding,
        template: &FaceTemplate,
    ) -> Result<MatchResult, SignError> {
        if template.identity_id != key.identity_id {
            return Err(SignError::IdentityNotEnrolled(key.identity_id));
        }
        let score = match_embeddings(probe, template, self.threshold)?;

        Ok(MatchResult {
            id: MatchId::new(key, request_id, probe_index),
            document_id: key.document_id,
            identity_id: key.identity_id,
            probe_index,
            similarity: score.similarity,
            best_template_index: score.best_template_index,
            accepted: score.accepted,
            threshold: self.threshold,
            recorded_at_ms: now_ms(),
        })
    }
}

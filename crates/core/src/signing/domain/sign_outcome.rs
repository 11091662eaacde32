use std::fmt;

use serde::{Deserialize, Serialize};

use crate::matching::domain::match_result::MatchResult;
use crate::shared::sign_error::SignError;

/// Machine-readable reason attached to every sign response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignReason {
    Signed,
    BelowThreshold,
    AlreadySigned,
    NoFaceDetected,
    AmbiguousFace,
    IdentityNotEnrolled,
    Timeout,
    InvalidImage,
    ExtractionFailed,
    PersistenceFailure,
    InferenceFailure,
    /// Stored template data for the signer is unusable.
    InvalidEnrollment,
}

impl SignReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignReason::Signed => "signed",
            SignReason::BelowThreshold => "below_threshold",
            SignReason::AlreadySigned => "already_signed",
            SignReason::NoFaceDetected => "no_face_detected",
            SignReason::AmbiguousFace => "ambiguous_face",
            SignReason::IdentityNotEnrolled => "identity_not_enrolled",
            SignReason::Timeout => "timeout",
            SignReason::InvalidImage => "invalid_image",
            SignReason::ExtractionFailed => "extraction_failed",
            SignReason::PersistenceFailure => "persistence_failure",
            SignReason::InferenceFailure => "inference_failure",
            SignReason::InvalidEnrollment => "invalid_enrollment",
        }
    }
}

impl fmt::Display for SignReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision of a completed sign request.
///
/// `match_results` holds the records written by this request; it is empty
/// when an existing signature was returned.
#[derive(Clone, Debug, PartialEq)]
pub struct SignOutcome {
    pub signed: bool,
    /// Best similarity across the request's probes.
    pub confidence: f64,
    pub reason: SignReason,
    pub match_results: Vec<MatchResult>,
}

/// Wire shape returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignResponse {
    pub signed: bool,
    pub confidence: f64,
    pub reason: SignReason,
}

impl SignResponse {
    pub fn from_result(result: &Result<SignOutcome, SignError>) -> Self {
        match result {
            Ok(outcome) => Self::from(outcome),
            Err(err) => Self::from(err),
        }
    }
}

impl From<&SignOutcome> for SignResponse {
    fn from(outcome: &SignOutcome) -> Self {
        Self {
            signed: outcome.signed,
            confidence: outcome.confidence,
            reason: outcome.reason,
        }
    }
}

impl From<&SignError> for SignResponse {
    fn from(err: &SignError) -> Self {
        Self {
            signed: false,
            confidence: 0.0,
            reason: err.reason(),
        }
    }
}

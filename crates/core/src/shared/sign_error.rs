use thiserror::Error;

use crate::shared::ids::{IdentityId, SigningKey};
use crate::signing::domain::sign_outcome::SignReason;

/// Failure taxonomy of the face-verified signing path.
///
/// A below-threshold comparison is not represented here: it is a valid
/// negative decision and is returned as a [`SignOutcome`](crate::signing::domain::sign_outcome::SignOutcome).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SignError {
    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("no face detected in probe image #{probe_index}")]
    NoFaceDetected { probe_index: usize },

    #[error(
        "ambiguous face in probe image #{probe_index}: top confidences {best:.3} and {runner_up:.3} are too close"
    )]
    AmbiguousFace {
        probe_index: usize,
        best: f64,
        runner_up: f64,
    },

    #[error("embedding extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("identity {0} is not enrolled")]
    IdentityNotEnrolled(IdentityId),

    #[error("already signed ({0})")]
    AlreadySigned(SigningKey),

    #[error("sign request exceeded {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("inference backend failure: {0}")]
    Inference(String),

    #[error("invalid enrollment: {0}")]
    Enrollment(String),
}

impl SignError {
    /// Infrastructure failures commit no partial state, so the whole request
    /// may be retried. Input problems yield the same result on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SignError::Timeout { .. } | SignError::PersistenceFailure(_) | SignError::Inference(_)
        )
    }

    pub fn reason(&self) -> SignReason {
        match self {
            SignError::InvalidImage(_) => SignReason::InvalidImage,
            SignError::NoFaceDetected { .. } => SignReason::NoFaceDetected,
            SignError::AmbiguousFace { .. } => SignReason::AmbiguousFace,
            SignError::ExtractionFailed(_) => SignReason::ExtractionFailed,
            SignError::Enrollment(_) => SignReason::InvalidEnrollment,
            SignError::IdentityNotEnrolled(_) => SignReason::IdentityNotEnrolled,
            SignError::AlreadySigned(_) => SignReason::AlreadySigned,
            SignError::Timeout { .. } => SignReason::Timeout,
            SignError::PersistenceFailure(_) => SignReason::PersistenceFailure,
            SignError::Inference(_) => SignReason::InferenceFailure,
        }
    }
}

/// Maps an ONNX Runtime (or other backend) error into [`SignError::Inference`].
pub fn inference_error(e: impl std::fmt::Display) -> SignError {
    SignError::Inference(e.to_string())
}

/// Maps an I/O or serialization error into [`SignError::PersistenceFailure`].
pub fn persistence_error(e: impl std::fmt::Display) -> SignError {
    SignError::PersistenceFailure(e.to_string())
}

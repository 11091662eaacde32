use std::fmt;

/// Stages a sign request moves through.
///
/// `Received → FaceDetected → EmbeddingExtracted → Matched → {Signed | Rejected} → Recorded`,
/// with `Errored` reachable from any non-terminal stage. Detection and
/// extraction repeat once per probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignState {
    Received,
    FaceDetected,
    EmbeddingExtracted,
    Matched,
    Signed,
    Rejected,
    Recorded,
    Errored,
}

impl SignState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignState::Received => "received",
            SignState::FaceDetected => "face_detected",
            SignState::EmbeddingExtracted => "embedding_extracted",
            SignState::Matched => "matched",
            SignState::Signed => "signed",
            SignState::Rejected => "rejected",
            SignState::Recorded => "recorded",
            SignState::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SignState::Recorded | SignState::Errored)
    }

    pub fn can_transition_to(&self, next: SignState) -> bool {
        use SignState::*;
        match (self, next) {
            (s, Errored) => !s.is_terminal(),
            (Received, FaceDetected)
            | (FaceDetected, EmbeddingExtracted)
            | (EmbeddingExtracted, FaceDetected)
            | (EmbeddingExtracted, Matched)
            | (Matched, Signed)
            | (Matched, Rejected)
            | (Signed, Recorded)
            | (Rejected, Recorded) => true,
            // Idempotent replay of an existing signature skips evaluation.
            (Received, Recorded) => true,
            // Another writer signed the key while this request was evaluating.
            (Matched, Recorded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::matching::domain::match_result::MatchResult;
use crate::pipeline::sign_state::SignState;
use crate::shared::ids::SigningKey;
use crate::shared::sign_error::SignError;
use crate::signing::domain::sign_outcome::SignOutcome;

/// Cross-cutting sink for sign request events.
///
/// Use cases report stage transitions, match records and outcomes here
/// instead of writing to a specific output. Shared across request threads,
/// so implementations synchronize internally.
pub trait AuditLogger: Send + Sync {
    /// A request entered `state`.
    fn transition(&self, key: SigningKey, state: SignState);

    /// One probe was scored against the template.
    fn match_recorded(&self, result: &MatchResult);

    /// A request finished with a decision.
    fn outcome(&self, key: SigningKey, outcome: &SignOutcome);

    /// A request failed before a decision was made.
    fn failure(&self, key: SigningKey, error: &SignError);

    /// How long a named stage took.
    fn timing(&self, stage: &str, duration_ms: f64);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards all events.
pub struct NullAuditLogger;

impl AuditLogger for NullAuditLogger {
    fn transition(&self, _key: SigningKey, _state: SignState) {}
    fn match_recorded(&self, _result: &MatchResult) {}
    fn outcome(&self, _key: SigningKey, _outcome: &SignOutcome) {}
    fn failure(&self, _key: SigningKey, _error: &SignError) {}
    fn timing(&self, _stage: &str, _duration_ms: f64) {}
}

#[derive(Default)]
struct Tallies {
    timings: HashMap<String, Vec<f64>>,
    reasons: HashMap<&'static str, usize>,
    matches: usize,
}

/// Writes audit events through the `log` facade and keeps per-stage timings
/// and outcome counts for a summary report.
pub struct LogAuditLogger {
    tallies: Mutex<Tallies>,
    start_time: Instant,
}

impl LogAuditLogger {
    pub fn new() -> Self {
        Self {
            tallies: Mutex::new(Tallies::default()),
            start_time: Instant::now(),
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        let tallies = self.tallies.lock().ok()?;
        if tallies.timings.is_empty() && tallies.reasons.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let requests: usize = tallies.reasons.values().sum();
        let mut lines = vec![format!(
            "Audit summary ({requests} requests, {} matches, {:.1}s total):",
            tallies.matches,
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = tallies.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &tallies.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            lines.push(format!(
                "  {stage:12}: avg {avg_ms:6.1}ms  total {total_ms:7.0}ms  ({} calls)",
                durations.len()
            ));
        }

        let mut reasons: Vec<_> = tallies.reasons.iter().collect();
        reasons.sort();
        for (reason, count) in reasons {
            lines.push(format!("  {reason}: {count}"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<Vec<f64>> {
        self.tallies.lock().ok()?.timings.get(stage).cloned()
    }

    pub fn reason_count(&self, reason: &str) -> usize {
        self.tallies
            .lock()
            .ok()
            .and_then(|t| t.reasons.get(reason).copied())
            .unwrap_or(0)
    }

    fn tally_reason(&self, reason: &'static str) {
        if let Ok(mut tallies) = self.tallies.lock() {
            *tallies.reasons.entry(reason).or_default() += 1;
        }
    }
}

impl Default for LogAuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger for LogAuditLogger {
    fn transition(&self, key: SigningKey, state: SignState) {
        log::debug!("{key}: {state}");
    }

    fn match_recorded(&self, result: &MatchResult) {
        if let Ok(mut tallies) = self.tallies.lock() {
            tallies.matches += 1;
        }
        log::info!(
            "match_recorded id={} {} probe={} similarity={:.4} threshold={:.4} accepted={}",
            result.id,
            result.key(),
            result.probe_index,
            result.similarity,
            result.threshold,
            result.accepted
        );
    }

    fn outcome(&self, key: SigningKey, outcome: &SignOutcome) {
        self.tally_reason(outcome.reason.as_str());
        log::info!(
            "{key}: {} (signed={} confidence={:.4})",
            outcome.reason,
            outcome.signed,
            outcome.confidence
        );
    }

    fn failure(&self, key: SigningKey, error: &SignError) {
        self.tally_reason(error.reason().as_str());
        if error.is_retryable() {
            log::warn!("{key}: {error} (retryable)");
        } else {
            log::info!("{key}: {error}");
        }
    }

    fn timing(&self, stage: &str, duration_ms: f64) {
        if let Ok(mut tallies) = self.tallies.lock() {
            tallies
                .timings
                .entry(stage.to_string())
                .or_default()
                .push(duration_ms);
        }
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::ids::{DocumentId, IdentityId};
    use crate::signing::domain::sign_outcome::SignReason;

    fn key() -> SigningKey {
        SigningKey::new(DocumentId(1), IdentityId(2))
    }

    fn outcome(reason: SignReason) -> SignOutcome {
        SignOutcome {
            signed: reason == SignReason::Signed,
            confidence: 0.9,
            reason,
            match_results: vec![],
        }
    }

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let logger = NullAuditLogger;
        logger.transition(key(), SignState::Received);
        logger.outcome(key(), &outcome(SignReason::Signed));
        logger.failure(key(), &SignError::Timeout { timeout_ms: 1 });
        logger.timing("detect", 5.0);
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let logger = LogAuditLogger::new();
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("extract", 5.0);

        assert_eq!(logger.timings_for("detect").unwrap(), vec![20.0, 30.0]);
        assert_eq!(logger.timings_for("extract").unwrap().len(), 1);
        assert!(logger.timings_for("match").is_none());
    }

    #[test]
    fn test_outcomes_and_failures_are_counted_by_reason() {
        let logger = LogAuditLogger::new();
        logger.outcome(key(), &outcome(SignReason::Signed));
        logger.outcome(key(), &outcome(SignReason::BelowThreshold));
        logger.outcome(key(), &outcome(SignReason::Signed));
        logger.failure(key(), &SignError::NoFaceDetected { probe_index: 0 });

        assert_eq!(logger.reason_count("signed"), 2);
        assert_eq!(logger.reason_count("below_threshold"), 1);
        assert_eq!(logger.reason_count("no_face_detected"), 1);
    }

    #[test]
    fn test_summary_includes_stages_and_reasons() {
        let logger = LogAuditLogger::new();
        logger.timing("detect", 12.0);
        logger.outcome(key(), &outcome(SignReason::Signed));

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Audit summary (1 requests"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("signed: 1"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(LogAuditLogger::new().summary_string().is_none());
    }
}

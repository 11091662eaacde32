use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::RecvTimeoutError;

use crate::config::SignConfig;
use crate::matching::domain::match_result::MatchResult;
use crate::matching::domain::matcher::Matcher;
use crate::pipeline::audit_logger::AuditLogger;
use crate::pipeline::face_embedder::FaceEmbedder;
use crate::pipeline::keyed_locks::KeyedLocks;
use crate::pipeline::sign_state::SignState;
use crate::shared::clock::now_ms;
use crate::shared::ids::{DocumentId, IdentityId, SigningKey};
use crate::shared::probe_image::ProbeImage;
use crate::shared::sign_error::SignError;
use crate::signing::domain::document_signature::DocumentSignature;
use crate::signing::domain::sign_outcome::{SignOutcome, SignReason};
use crate::signing::domain::signature_repository::SignatureRepository;
use crate::templates::domain::face_template::FaceTemplate;
use crate::templates::domain::template_store::TemplateStore;

/// Face-verified sign action for one (document, signer) pair.
///
/// Requests for the same key are serialized from the idempotency check to
/// the final write. Detection, extraction and matching run on a worker
/// thread bounded by `sign_timeout_ms`; nothing is persisted until that
/// evaluation has returned, so a timeout leaves no state behind.
pub struct SignDocumentUseCase {
    embedder: Arc<FaceEmbedder>,
    templates: Arc<dyn TemplateStore>,
    signatures: Arc<dyn SignatureRepository>,
    audit: Arc<dyn AuditLogger>,
    matcher: Matcher,
    config: SignConfig,
    locks: KeyedLocks<SigningKey>,
    request_seq: AtomicU64,
}

impl SignDocumentUseCase {
    pub fn new(
        embedder: Arc<FaceEmbedder>,
        templates: Arc<dyn TemplateStore>,
        signatures: Arc<dyn SignatureRepository>,
        audit: Arc<dyn AuditLogger>,
        config: SignConfig,
    ) -> Self {
        Self {
            embedder,
            templates,
            signatures,
            audit,
            matcher: Matcher::new(config.match_threshold),
            config,
            locks: KeyedLocks::new(),
            request_seq: AtomicU64::new(0),
        }
    }

    /// Verifies the probes against the signer's template and, on a match,
    /// records the signature.
    ///
    /// A below-threshold comparison is a successful call with
    /// `signed = false`; errors mean no decision could be made.
    pub fn sign_document(
        &self,
        document_id: DocumentId,
        identity_id: IdentityId,
        probes: Vec<ProbeImage>,
    ) -> Result<SignOutcome, SignError> {
        let key = SigningKey::new(document_id, identity_id);
        let request_id = format!(
            "{}.{}",
            now_ms(),
            self.request_seq.fetch_add(1, Ordering::Relaxed)
        );
        self.audit.transition(key, SignState::Received);

        let start = Instant::now();
        let result = self.run(key, &request_id, probes);
        self.audit
            .timing("request", start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok(outcome) => {
                self.audit.transition(key, SignState::Recorded);
                self.audit.outcome(key, outcome);
            }
            Err(err) => {
                self.audit.transition(key, SignState::Errored);
                self.audit.failure(key, err);
            }
        }
        result
    }

    fn run(
        &self,
        key: SigningKey,
        request_id: &str,
        probes: Vec<ProbeImage>,
    ) -> Result<SignOutcome, SignError> {
        let _guard = self.locks.lock(&key);

        if let Some(existing) = self.signatures.find(key)?.filter(|s| s.signed) {
            if !self.config.allow_resign_noop {
                return Err(SignError::AlreadySigned(key));
            }
            return Ok(SignOutcome {
                signed: true,
                confidence: existing.confidence,
                reason: SignReason::AlreadySigned,
                match_results: Vec::new(),
            });
        }

        if probes.is_empty() {
            return Err(SignError::InvalidImage("no probe images submitted".into()));
        }
        let template = self.templates.get_templates(key.identity_id)?;

        let match_results = self.evaluate_with_timeout(key, request_id, probes, template)?;
        self.audit.transition(key, SignState::Matched);

        let best = match_results
            .iter()
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
            .ok_or_else(|| SignError::Inference("evaluation produced no match results".into()))?;
        let confidence = best.similarity;
        let authorizing = best.accepted.then(|| best.id.clone());

        let write_start = Instant::now();
        let outcome = match authorizing {
            Some(match_result_id) => {
                let signature = DocumentSignature {
                    document_id: key.document_id,
                    identity_id: key.identity_id,
                    signed: true,
                    match_result_id,
                    confidence,
                    applied_at_ms: now_ms(),
                };
                match self.signatures.commit_signature(&match_results, &signature) {
                    Ok(()) => {
                        self.audit.transition(key, SignState::Signed);
                        SignOutcome {
                            signed: true,
                            confidence,
                            reason: SignReason::Signed,
                            match_results,
                        }
                    }
                    Err(SignError::AlreadySigned(_)) => {
                        self.signed_elsewhere(key, match_results)?
                    }
                    Err(err) => return Err(err),
                }
            }
            None => {
                self.signatures.record_rejection(&match_results)?;
                self.audit.transition(key, SignState::Rejected);
                SignOutcome {
                    signed: false,
                    confidence,
                    reason: SignReason::BelowThreshold,
                    match_results,
                }
            }
        };
        self.audit
            .timing("persist", write_start.elapsed().as_secs_f64() * 1000.0);
        for result in &outcome.match_results {
            self.audit.match_recorded(result);
        }

        Ok(outcome)
    }

    /// The key was signed by another writer of the same repository while this
    /// request was evaluating. Its results are kept as audit entries and the
    /// stored signature is returned as for any repeated request.
    fn signed_elsewhere(
        &self,
        key: SigningKey,
        match_results: Vec<MatchResult>,
    ) -> Result<SignOutcome, SignError> {
        self.signatures.record_rejection(&match_results)?;
        for result in &match_results {
            self.audit.match_recorded(result);
        }
        if !self.config.allow_resign_noop {
            return Err(SignError::AlreadySigned(key));
        }
        let existing = self.signatures.find(key)?.ok_or_else(|| {
            SignError::PersistenceFailure(format!("signature for {key} vanished after commit"))
        })?;
        log::info!("{key} was signed concurrently; returning the stored signature");
        Ok(SignOutcome {
            signed: true,
            confidence: existing.confidence,
            reason: SignReason::AlreadySigned,
            match_results: Vec::new(),
        })
    }

    fn evaluate_with_timeout(
        &self,
        key: SigningKey,
        request_id: &str,
        probes: Vec<ProbeImage>,
        template: Arc<FaceTemplate>,
    ) -> Result<Vec<MatchResult>, SignError> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let embedder = Arc::clone(&self.embedder);
        let audit = Arc::clone(&self.audit);
        let matcher = self.matcher;
        let request_id = request_id.to_string();
        let abandoned = Arc::new(AtomicBool::new(false));
        let worker_abandoned = Arc::clone(&abandoned);

        // Detached on timeout; the worker only computes, so abandoning it
        // cannot leave partial state.
        std::thread::spawn(move || {
            let result = evaluate_probes(
                &embedder,
                &matcher,
                audit.as_ref(),
                &worker_abandoned,
                key,
                &request_id,
                &probes,
                &template,
            );
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.config.sign_timeout()) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                Err(SignError::Timeout {
                    timeout_ms: self.config.sign_timeout_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(SignError::Inference(
                "evaluation worker exited without a result".into(),
            )),
        }
    }
}

/// Scores every probe in submission order; the first failing probe fails
/// the whole request. Once `abandoned` is set the request has already been
/// answered, so the worker stops reporting and returns at the next probe.
#[allow(clippy::too_many_arguments)]
fn evaluate_probes(
    embedder: &FaceEmbedder,
    matcher: &Matcher,
    audit: &dyn AuditLogger,
    abandoned: &AtomicBool,
    key: SigningKey,
    request_id: &str,
    probes: &[ProbeImage],
    template: &FaceTemplate,
) -> Result<Vec<MatchResult>, SignError> {
    let mut results = Vec::with_capacity(probes.len());
    let live = || !abandoned.load(Ordering::SeqCst);

    for (probe_index, probe) in probes.iter().enumerate() {
        if !live() {
            return Ok(results);
        }
        let t0 = Instant::now();
        let raster = probe.decode()?;
        let t1 = Instant::now();
        let region = embedder.locate(&raster, probe_index)?;
        let t2 = Instant::now();
        if live() {
            audit.transition(key, SignState::FaceDetected);
        }
        let embedding = embedder.extract(&raster, &region)?;
        let t3 = Instant::now();
        if live() {
            audit.transition(key, SignState::EmbeddingExtracted);
        }
        let result = matcher.evaluate(key, request_id, probe_index, &embedding, template)?;
        let t4 = Instant::now();

        if live() {
            audit.timing("decode", (t1 - t0).as_secs_f64() * 1000.0);
            audit.timing("detect", (t2 - t1).as_secs_f64() * 1000.0);
            audit.timing("extract", (t3 - t2).as_secs_f64() * 1000.0);
            audit.timing("match", (t4 - t3).as_secs_f64() * 1000.0);
        }

        results.push(result);
    }

    Ok(results)
}

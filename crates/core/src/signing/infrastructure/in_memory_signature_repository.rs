use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::matching::domain::match_result::MatchResult;
use crate::shared::ids::{MatchId, SigningKey};
use crate::shared::sign_error::SignError;
use crate::signing::domain::document_signature::DocumentSignature;
use crate::signing::domain::signature_repository::SignatureRepository;

/// Materialized view of signatures and match results.
///
/// Shared by the in-memory repository and the journal replay.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    signatures: HashMap<SigningKey, DocumentSignature>,
    match_results: Vec<MatchResult>,
    by_id: HashMap<MatchId, usize>,
}

impl Ledger {
    pub(crate) fn check_unsigned(&self, key: SigningKey) -> Result<(), SignError> {
        if self.signatures.contains_key(&key) {
            return Err(SignError::AlreadySigned(key));
        }
        Ok(())
    }

    pub(crate) fn apply_commit(&mut self, match_results: &[MatchResult], signature: &DocumentSignature) {
        self.append_results(match_results);
        self.signatures.insert(signature.key(), signature.clone());
    }

    pub(crate) fn append_results(&mut self, match_results: &[MatchResult]) {
        for result in match_results {
            self.by_id.insert(result.id.clone(), self.match_results.len());
            self.match_results.push(result.clone());
        }
    }

    pub(crate) fn find(&self, key: SigningKey) -> Option<DocumentSignature> {
        self.signatures.get(&key).cloned()
    }

    pub(crate) fn results_for(&self, key: SigningKey) -> Vec<MatchResult> {
        self.match_results
            .iter()
            .filter(|r| r.key() == key)
            .cloned()
            .collect()
    }

    pub(crate) fn find_result(&self, id: &MatchId) -> Option<MatchResult> {
        self.by_id.get(id).map(|&i| self.match_results[i].clone())
    }

    pub(crate) fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    pub(crate) fn match_result_count(&self) -> usize {
        self.match_results.len()
    }
}

/// Volatile repository; commits are atomic under a single mutex.
#[derive(Default)]
pub struct InMemorySignatureRepository {
    ledger: Mutex<Ledger>,
}

impl InMemorySignatureRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signature_count(&self) -> usize {
        self.ledger.lock().map(|l| l.signature_count()).unwrap_or(0)
    }

    pub fn match_result_count(&self) -> usize {
        self.ledger.lock().map(|l| l.match_result_count()).unwrap_or(0)
    }

    fn ledger(&self) -> Result<MutexGuard<'_, Ledger>, SignError> {
        self.ledger
            .lock()
            .map_err(|e| SignError::PersistenceFailure(format!("Lock poisoned: {e}")))
    }
}

impl SignatureRepository for InMemorySignatureRepository {
    fn find(&self, key: SigningKey) -> Result<Option<DocumentSignature>, SignError> {
        Ok(self.ledger()?.find(key))
    }

    fn commit_signature(
        &self,
        match_results: &[MatchResult],
        signature: &DocumentSignature,
    ) -> Result<(), SignError> {
        let mut ledger = self.ledger()?;
        ledger.check_unsigned(signature.key())?;
        ledger.apply_commit(match_results, signature);
        Ok(())
    }

    fn record_rejection(&self, match_results: &[MatchResult]) -> Result<(), SignError> {
        self.ledger()?.append_results(match_results);
        Ok(())
    }

    fn match_results_for(&self, key: SigningKey) -> Result<Vec<MatchResult>, SignError> {
        Ok(self.ledger()?.results_for(key))
    }

    fn find_match_result(&self, id: &MatchId) -> Result<Option<MatchResult>, SignError> {
        Ok(self.ledger()?.find_result(id))
    }
}

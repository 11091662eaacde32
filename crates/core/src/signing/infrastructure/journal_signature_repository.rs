use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::matching::domain::match_result::MatchResult;
use crate::shared::ids::{MatchId, SigningKey};
use crate::shared::sign_error::{persistence_error, SignError};
use crate::signing::domain::document_signature::DocumentSignature;
use crate::signing::domain::signature_repository::SignatureRepository;
use crate::signing::infrastructure::in_memory_signature_repository::Ledger;

/// One line of the journal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum JournalEntry {
    Staged {
        txn: u64,
        match_results: Vec<MatchResult>,
        signature: DocumentSignature,
    },
    Committed {
        txn: u64,
    },
    Audit {
        match_results: Vec<MatchResult>,
    },
}

/// What a recovery sweep found in the journal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub committed_signatures: usize,
    pub audit_entries: usize,
    /// Staged transactions with no commit marker.
    pub discarded_transactions: usize,
    /// Lines that failed to parse, typically a torn final append.
    pub discarded_lines: usize,
    /// Whether the journal was rewritten without the discarded entries.
    pub compacted: bool,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        self.discarded_transactions == 0 && self.discarded_lines == 0
    }
}

struct JournalState {
    file: File,
    /// Length of the journal up to the last fully written entry.
    durable_len: u64,
    /// What the file looked like when this process last read or wrote it.
    seen: Option<Fingerprint>,
    next_txn: u64,
    ledger: Ledger,
}

/// Cheap identity of the journal file; compaction replaces the file, so the
/// inode changes even when the length does not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
    #[cfg(unix)]
    inode: (u64, u64),
}

impl Fingerprint {
    fn of(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        use std::os::unix::fs::MetadataExt;

        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
            #[cfg(unix)]
            inode: (metadata.dev(), metadata.ino()),
        }
    }
}

/// Signature repository backed by an append-only JSON-lines journal.
///
/// A signature commit is two appends: a `staged` entry carrying the match
/// results and the signature, then a `committed` marker, each followed by an
/// fsync. Only transactions with a marker are visible after replay. A failed
/// append truncates the file back to its last durable length.
///
/// Several repositories, in one process or many, may share a journal. Every
/// operation holds an exclusive lock on `<journal>.lock` and replays the
/// journal first if another writer changed it, so the unsigned check and the
/// commit see the same state on every writer.
pub struct JournalSignatureRepository {
    path: PathBuf,
    lock_file: File,
    state: Mutex<JournalState>,
    opened_with: RecoveryReport,
}

/// Exclusive hold on the journal's lock file, released on drop.
struct JournalLock<'a>(&'a File);

impl<'a> JournalLock<'a> {
    fn acquire(file: &'a File) -> Result<Self, SignError> {
        FileExt::lock_exclusive(file).map_err(persistence_error)?;
        Ok(Self(file))
    }
}

impl Drop for JournalLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.0) {
            log::warn!("Failed to release signature journal lock: {e}");
        }
    }
}

impl JournalSignatureRepository {
    /// Opens (or creates) the journal, running a recovery sweep first.
    pub fn open(path: &Path) -> Result<Self, SignError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(persistence_error)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(lock_path(path))
            .map_err(persistence_error)?;

        let (state, report) = {
            let _lock = JournalLock::acquire(&lock_file)?;
            load(path)?
        };
        log::debug!(
            "Opened signature journal {} ({} signatures, {} audit entries)",
            path.display(),
            report.committed_signatures,
            report.audit_entries
        );
        Ok(Self {
            path: path.to_path_buf(),
            lock_file,
            state: Mutex::new(state),
            opened_with: report,
        })
    }

    /// Report of the sweep that ran when the journal was opened.
    pub fn opened_with(&self) -> &RecoveryReport {
        &self.opened_with
    }

    /// Re-runs the recovery sweep against the file on disk and reloads.
    pub fn recover(&self) -> Result<RecoveryReport, SignError> {
        let mut state = self.state()?;
        let _lock = JournalLock::acquire(&self.lock_file)?;
        let (fresh, report) = load(&self.path)?;
        *state = fresh;
        Ok(report)
    }

    pub fn signature_count(&self) -> Result<usize, SignError> {
        let (state, _lock) = self.synced()?;
        Ok(state.ledger.signature_count())
    }

    fn state(&self) -> Result<MutexGuard<'_, JournalState>, SignError> {
        self.state
            .lock()
            .map_err(|e| SignError::PersistenceFailure(format!("Lock poisoned: {e}")))
    }

    /// Locks the journal and brings the in-memory view up to date with it.
    fn synced(&self) -> Result<(MutexGuard<'_, JournalState>, JournalLock<'_>), SignError> {
        let mut state = self.state()?;
        let lock = JournalLock::acquire(&self.lock_file)?;
        let current = fingerprint(&self.path)?;
        if state.seen.is_none() || state.seen != current {
            log::debug!("Signature journal {} changed on disk; replaying", self.path.display());
            let (fresh, _report) = load(&self.path)?;
            *state = fresh;
        } else {
            // Appends must land in the file currently at `path`.
            state.file = open_for_append(&self.path)?;
        }
        Ok((state, lock))
    }
}

impl JournalState {
    /// Appends entries as one durable step; rolls back on failure.
    fn append(&mut self, entries: &[JournalEntry]) -> Result<(), SignError> {
        let result = self.try_append(entries);
        if let Err(err) = result {
            if let Err(rollback) = self.file.set_len(self.durable_len) {
                log::warn!("Failed to roll back journal after write error: {rollback}");
            }
            // Whatever is on disk now, the next operation replays it.
            self.seen = None;
            return Err(persistence_error(err));
        }
        self.seen = Some(Fingerprint::of(
            &self.file.metadata().map_err(persistence_error)?,
        ));
        Ok(())
    }

    fn try_append(&mut self, entries: &[JournalEntry]) -> io::Result<()> {
        let mut written = 0u64;
        for entry in entries {
            let mut line = serde_json::to_string(entry).map_err(io::Error::other)?;
            line.push('\n');
            self.file.write_all(line.as_bytes())?;
            self.file.sync_data()?;
            written += line.len() as u64;
        }
        self.durable_len += written;
        Ok(())
    }
}

impl SignatureRepository for JournalSignatureRepository {
    fn find(&self, key: SigningKey) -> Result<Option<DocumentSignature>, SignError> {
        let (state, _lock) = self.synced()?;
        Ok(state.ledger.find(key))
    }

    fn commit_signature(
        &self,
        match_results: &[MatchResult],
        signature: &DocumentSignature,
    ) -> Result<(), SignError> {
        let (mut state, _lock) = self.synced()?;
        state.ledger.check_unsigned(signature.key())?;

        // Reserved up front: a staged entry left behind by a failed append
        // must never share its id with a later commit marker.
        let txn = state.next_txn;
        state.next_txn += 1;
        state.append(&[
            JournalEntry::Staged {
                txn,
                match_results: match_results.to_vec(),
                signature: signature.clone(),
            },
            JournalEntry::Committed { txn },
        ])?;
        state.ledger.apply_commit(match_results, signature);
        Ok(())
    }

    fn record_rejection(&self, match_results: &[MatchResult]) -> Result<(), SignError> {
        if match_results.is_empty() {
            return Ok(());
        }
        let (mut state, _lock) = self.synced()?;
        state.append(&[JournalEntry::Audit {
            match_results: match_results.to_vec(),
        }])?;
        state.ledger.append_results(match_results);
        Ok(())
    }

    fn match_results_for(&self, key: SigningKey) -> Result<Vec<MatchResult>, SignError> {
        let (state, _lock) = self.synced()?;
        Ok(state.ledger.results_for(key))
    }

    fn find_match_result(&self, id: &MatchId) -> Result<Option<MatchResult>, SignError> {
        let (state, _lock) = self.synced()?;
        Ok(state.ledger.find_result(id))
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("journal"));
    name.push(".lock");
    path.with_file_name(name)
}

fn open_for_append(path: &Path) -> Result<File, SignError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(persistence_error)
}

fn fingerprint(path: &Path) -> Result<Option<Fingerprint>, SignError> {
    match fs::metadata(path) {
        Ok(metadata) => Ok(Some(Fingerprint::of(&metadata))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(persistence_error(e)),
    }
}

/// Replays the journal, compacts it if anything was discarded, and opens it
/// for appending. Callers hold the journal lock.
fn load(path: &Path) -> Result<(JournalState, RecoveryReport), SignError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(persistence_error(e)),
    };

    let (kept, ledger, next_txn, mut report) = replay(&text);

    if !report.is_clean() || (!text.is_empty() && !text.ends_with('\n')) {
        compact(path, &kept)?;
        report.compacted = true;
        log::warn!(
            "Signature journal {}: discarded {} uncommitted transactions and {} unreadable lines",
            path.display(),
            report.discarded_transactions,
            report.discarded_lines
        );
    }

    let file = open_for_append(path)?;
    let metadata = file.metadata().map_err(persistence_error)?;

    Ok((
        JournalState {
            file,
            durable_len: metadata.len(),
            seen: Some(Fingerprint::of(&metadata)),
            next_txn,
            ledger,
        },
        report,
    ))
}

fn replay(text: &str) -> (Vec<JournalEntry>, Ledger, u64, RecoveryReport) {
    let mut report = RecoveryReport::default();
    let mut entries = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                log::warn!("Skipping unreadable journal line {}: {e}", line_no + 1);
                report.discarded_lines += 1;
            }
        }
    }

    let committed: HashSet<u64> = entries
        .iter()
        .filter_map(|e| match e {
            JournalEntry::Committed { txn } => Some(*txn),
            _ => None,
        })
        .collect();

    let mut ledger = Ledger::default();
    let mut kept = Vec::new();
    let mut applied: HashSet<u64> = HashSet::new();
    let mut next_txn = 0u64;

    for entry in entries {
        match &entry {
            JournalEntry::Staged {
                txn,
                match_results,
                signature,
            } => {
                next_txn = next_txn.max(txn + 1);
                let visible = committed.contains(txn)
                    && !applied.contains(txn)
                    && ledger.check_unsigned(signature.key()).is_ok();
                if !visible {
                    report.discarded_transactions += 1;
                    continue;
                }
                ledger.apply_commit(match_results, signature);
                applied.insert(*txn);
                report.committed_signatures += 1;
                kept.push(entry.clone());
                kept.push(JournalEntry::Committed { txn: *txn });
            }
            JournalEntry::Committed { txn } => {
                next_txn = next_txn.max(txn + 1);
            }
            JournalEntry::Audit { match_results } => {
                ledger.append_results(match_results);
                report.audit_entries += 1;
                kept.push(entry.clone());
            }
        }
    }

    (kept, ledger, next_txn, report)
}

fn compact(path: &Path, entries: &[JournalEntry]) -> Result<(), SignError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(persistence_error)?;
    for entry in entries {
        let line = serde_json::to_string(entry).map_err(persistence_error)?;
        writeln!(tmp, "{line}").map_err(persistence_error)?;
    }
    tmp.as_file().sync_all().map_err(persistence_error)?;
    tmp.persist(path).map_err(|e| persistence_error(e.error))?;
    Ok(())
}

//! The predecessor scanner: "have all jobs queued before mine finished?"
//!
//! A predecessor is any visible record whose name compares strictly below the
//! reference name. Liveness is judged purely by lock probes; wall-clock
//! reasoning appears nowhere. Records that vanish between passes were
//! relocated or deleted after finishing and count as finished.

use std::collections::HashSet;
use std::fs::File;
use std::io;

use crate::error::{QueueError, Result};
use crate::lock;
use crate::store::{RecordName, RecordStore};

/// Outcome of a non-blocking readiness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Every predecessor has released its lock.
    Ready,
    /// This predecessor is still running. Probing stopped at the first one.
    Blocked(RecordName),
}

pub struct PredecessorScanner<'a> {
    store: &'a RecordStore,
    reference: RecordName,
    strict_order: bool,
}

impl<'a> PredecessorScanner<'a> {
    /// Scanner anchored on a published record's own name. Keys are handed
    /// out monotonically, so a predecessor surfacing after the first pass
    /// breaks key order and is warned about.
    pub fn new(store: &'a RecordStore, reference: RecordName) -> Self {
        Self {
            store,
            reference,
            strict_order: true,
        }
    }

    /// Scanner over everything queued so far, anchored one millisecond
    /// ahead of the clock. Records can legitimately be published below that
    /// anchor after scanning starts; late arrivals are waited on but not
    /// flagged.
    pub fn for_horizon(store: &'a RecordStore) -> Self {
        Self {
            store,
            reference: RecordName::horizon(),
            strict_order: false,
        }
    }

    fn predecessors(&self) -> io::Result<Vec<RecordName>> {
        let mut names = self.store.list()?;
        names.retain(|n| *n < self.reference);
        Ok(names)
    }

    /// Probe a single predecessor. `Ok(None)` means finished (or vanished);
    /// `Ok(Some(file))` hands back the still-locked record's handle.
    fn probe(&self, name: &RecordName) -> Result<Option<File>> {
        let file = match self.store.open_record(name) {
            Ok(f) => f,
            // Relocated or deleted after finishing: treated as finished.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(QueueError::RecordIo {
                    name: name.to_string(),
                    source: e,
                });
            }
        };
        let finished = lock::probe_finished(&file).map_err(|e| QueueError::RecordIo {
            name: name.to_string(),
            source: e,
        })?;
        if finished {
            // The owner is gone; the record is no longer "about to run".
            // Best effort: the record may have been relocated underneath us.
            let _ = self.store.clear_active_flag(name);
            Ok(None)
        } else {
            Ok(Some(file))
        }
    }

    /// One non-blocking pass over the predecessors. Used by test mode, which
    /// must report in bounded time no matter how long jobs run.
    pub fn poll(&self) -> Result<Readiness> {
        for name in self.predecessors()? {
            if self.probe(&name)?.is_some() {
                return Ok(Readiness::Blocked(name));
            }
        }
        Ok(Readiness::Ready)
    }

    /// Full pass: probe every predecessor and return the still-running one
    /// with the greatest key, if any. `seen` accumulates every name ever
    /// enumerated so late arrivals can be flagged.
    fn scan_pass(
        &self,
        seen: &mut HashSet<RecordName>,
        first_pass: bool,
    ) -> Result<Option<(RecordName, File)>> {
        let mut newest_blocker: Option<(RecordName, File)> = None;
        for name in self.predecessors()? {
            if !first_pass && !seen.contains(&name) {
                if self.strict_order {
                    // A predecessor cannot be published after our own key
                    // existed long enough to be scanned once. Wait for it
                    // anyway; never skip it.
                    tracing::warn!(
                        record = %name,
                        reference = %self.reference,
                        "predecessor appeared after scanning started; key order violated"
                    );
                } else {
                    tracing::debug!(record = %name, "record published while waiting");
                }
            }
            seen.insert(name.clone());
            if let Some(file) = self.probe(&name)? {
                // The listing is sorted ascending, so the latest hit wins.
                newest_blocker = Some((name, file));
            }
        }
        Ok(newest_blocker)
    }

    /// Block until every predecessor has finished.
    ///
    /// Each pass waits on at most one lock, the newest blocker, and then
    /// rescans from scratch, because by the time the newest one has finished
    /// the older ones usually have too and will clear with non-blocking
    /// probes. Correctness does not depend on that: a pass only reports
    /// "done" when it found zero running predecessors.
    pub fn wait(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut first_pass = true;
        while let Some((name, file)) = self.scan_pass(&mut seen, first_pass)? {
            first_pass = false;
            tracing::debug!(record = %name, "waiting for predecessor to finish");
            lock::lock_exclusive(&file).map_err(|e| QueueError::RecordIo {
                name: name.to_string(),
                source: e,
            })?;
            // Dropping the handle releases our momentary hold on the lock.
            drop(file);
        }
        Ok(())
    }
}

/// Blocking wait restricted to an explicit set of records. Missing records
/// have already finished and been cleaned up.
pub fn wait_named(store: &RecordStore, names: &[RecordName]) -> Result<()> {
    for name in names {
        let file = match store.open_record(name) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(QueueError::RecordIo {
                    name: name.to_string(),
                    source: e,
                });
            }
        };
        lock::lock_exclusive(&file).map_err(|e| QueueError::RecordIo {
            name: name.to_string(),
            source: e,
        })?;
        drop(file);
    }
    Ok(())
}

/// Non-blocking readiness probe over an explicit set of records.
pub fn test_named(store: &RecordStore, names: &[RecordName]) -> Result<Readiness> {
    for name in names {
        let file = match store.open_record(name) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(QueueError::RecordIo {
                    name: name.to_string(),
                    source: e,
                });
            }
        };
        let finished = lock::probe_finished(&file).map_err(|e| QueueError::RecordIo {
            name: name.to_string(),
            source: e,
        })?;
        if !finished {
            return Ok(Readiness::Blocked(name.clone()));
        }
    }
    Ok(Readiness::Ready)
}

//! The follower: stream a record's growing content until its job finishes.
//!
//! Fully independent of the submission side; it consumes only the store's
//! naming convention and each record's lock state. Multiple followers may
//! read the same record concurrently; reads are never exclusive.

pub mod watch;

use std::fs::File;
use std::io::{self, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;

use crate::lock;
use crate::store::{RecordName, RecordStore};

pub use watch::{ChangeWatcher, IntervalWatcher, default_watcher};

/// Bound on a single read, matching the historical follower buffer.
const CHUNK: u64 = 8192;

#[derive(Debug, Clone, Default)]
pub struct FollowOptions {
    /// Emit only through the first newline per record, then consume silently.
    pub quiet: bool,
    /// Skip records that are not currently locked, even a sole one.
    pub running_only: bool,
}

/// Incremental reader over one record file.
///
/// Tracks a read position and tolerates truncation: if the file shrinks
/// below the position, the position resynchronizes to the new end. Stale
/// bytes are never re-emitted and shrinking is never an error.
pub struct RecordReader {
    file: File,
    pos: u64,
    seen_newline: bool,
}

impl RecordReader {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            file: File::open(path)?,
            pos: 0,
            seen_newline: false,
        })
    }

    /// Lock probe: acquirable means the owning process is gone and no more
    /// bytes will ever be appended.
    pub fn finished(&self) -> io::Result<bool> {
        lock::probe_finished(&self.file)
    }

    pub fn seen_newline(&self) -> bool {
        self.seen_newline
    }

    /// Read and emit everything currently available past the tracked
    /// position, in bounded chunks. Returns the number of bytes consumed;
    /// zero means the reader is caught up with the writer.
    pub fn drain(&mut self, out: &mut impl Write, quiet: bool) -> io::Result<u64> {
        let mut consumed = 0;
        loop {
            let len = self.file.metadata()?.len();
            if len < self.pos {
                // Truncated underneath us; pick up from the new end.
                self.pos = len;
            }
            if len == self.pos {
                return Ok(consumed);
            }

            let want = (len - self.pos).min(CHUNK) as usize;
            let mut buf = vec![0u8; want];
            let n = self.file.read_at(&mut buf, self.pos)?;
            if n == 0 {
                return Ok(consumed);
            }
            self.emit(&buf[..n], out, quiet)?;
            self.pos += n as u64;
            consumed += n as u64;
        }
    }

    fn emit(&mut self, bytes: &[u8], out: &mut impl Write, quiet: bool) -> io::Result<()> {
        if !quiet {
            return out.write_all(bytes);
        }
        if self.seen_newline {
            return Ok(());
        }
        match bytes.iter().position(|&b| b == b'\n') {
            Some(i) => {
                out.write_all(&bytes[..=i])?;
                self.seen_newline = true;
                Ok(())
            }
            None => out.write_all(bytes),
        }
    }
}

/// Follow each named record in turn, announcing it with a `==> name` header.
///
/// Already-finished records are skipped when more than one record is being
/// followed (re-invoking a follower over a mostly done queue should not
/// replay old output), and unconditionally under `running_only`.
pub fn follow(
    store: &RecordStore,
    names: &[RecordName],
    opts: &FollowOptions,
    watcher: &mut dyn ChangeWatcher,
    out: &mut impl Write,
) -> io::Result<()> {
    let sole = names.len() == 1;
    for name in names {
        let path = store.path(name);
        let mut reader = match RecordReader::open(&path) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };

        if reader.finished()? && (opts.running_only || !sole) {
            continue;
        }

        if opts.quiet {
            write!(out, "==> {name} ")?;
        } else {
            writeln!(out, "==> {name}")?;
        }

        loop {
            let consumed = reader.drain(out, opts.quiet)?;
            if consumed > 0 {
                continue;
            }
            if reader.finished()? {
                // Bytes appended between the last drain and the lock release
                // are still owed to the observer.
                reader.drain(out, opts.quiet)?;
                break;
            }
            out.flush()?;
            watcher.wait_for_change(&path)?;
        }

        if opts.quiet && !reader.seen_newline() {
            // Keep the one-line-per-record invariant for line-oriented
            // consumers even when the job never printed a newline.
            out.write_all(b"\n")?;
        }
        out.flush()?;
    }
    Ok(())
}

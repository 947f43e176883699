//! The record store: one directory, one file per job.
//!
//! Every mutation the protocol needs (create-exclusive, rename, delete,
//! move) is a single atomic filesystem operation, so observers never see a
//! half-updated store. The only multi-step sequence, claim-then-publish, hides
//! behind the `.` prefix until the atomic rename makes the record visible.

pub mod name;

use std::fs::{self, File, OpenOptions, Permissions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

pub use name::{KeyFactory, RecordName};

/// Mode bits while a record is queued or finished.
const MODE_QUEUED: u32 = 0o600;
/// Mode bits while the job is about to run or running. The executable bit is
/// an advisory at-a-glance flag only; the flock is what correctness rests on.
const MODE_ACTIVE: u32 = 0o700;

#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    /// Open the store, creating the directory if it does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &RecordName) -> PathBuf {
        self.dir.join(name.as_str())
    }

    fn hidden_path(&self, name: &RecordName) -> PathBuf {
        self.dir.join(name.hidden())
    }

    /// Create the record under its hidden name, exclusively.
    ///
    /// Fails with `AlreadyExists` on a key collision; the caller bumps the
    /// key and retries rather than ever overwriting an existing record.
    pub fn claim(&self, name: &RecordName) -> io::Result<File> {
        OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .append(true)
            .mode(MODE_QUEUED)
            .open(self.hidden_path(name))
    }

    /// Atomically rename the hidden record to its visible name, then flush
    /// the rename to stable storage. Once this returns, a scanner in any
    /// other process is guaranteed to observe the entry.
    pub fn publish(&self, name: &RecordName) -> io::Result<()> {
        fs::rename(self.hidden_path(name), self.path(name))?;
        File::open(&self.dir)?.sync_all()
    }

    /// Visible records, sorted by name (= by submission key).
    pub fn list(&self) -> io::Result<Vec<RecordName>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str().and_then(RecordName::parse) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    /// Open a visible record for reading and lock probing.
    pub fn open_record(&self, name: &RecordName) -> io::Result<File> {
        File::open(self.path(name))
    }

    /// Flip the advisory executable bit on. Called by the runner right
    /// before it starts the job.
    pub fn set_active_flag(&self, name: &RecordName) -> io::Result<()> {
        fs::set_permissions(self.path(name), Permissions::from_mode(MODE_ACTIVE))
    }

    /// Flip the advisory executable bit off. Called by the runner after the
    /// trailer is written, and by scanners when they observe a predecessor
    /// has finished.
    pub fn clear_active_flag(&self, name: &RecordName) -> io::Result<()> {
        fs::set_permissions(self.path(name), Permissions::from_mode(MODE_QUEUED))
    }

    /// Delete a finished record.
    pub fn remove(&self, name: &RecordName) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }

    /// Move a finished record into `dest`, creating it if absent. Rename is
    /// atomic within a filesystem; the lock, if still held, follows the open
    /// file description and is unaffected by the move.
    pub fn relocate(&self, name: &RecordName, dest: &Path) -> io::Result<()> {
        fs::create_dir_all(dest)?;
        fs::rename(self.path(name), dest.join(name.as_str()))
    }
}

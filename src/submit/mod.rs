//! The sequencer: the submission-side half of the protocol.
//!
//! Submission claims a position in the queue and returns to the caller as
//! soon as the record is durably visible; everything that can take time (the
//! predecessor wait, the job itself, the trailer, housekeeping) happens in a
//! detached runner process. Lock continuity across the handoff comes from
//! file descriptor inheritance: the runner's stdout/stderr ARE the locked
//! record file, so there is no instant at which the record is visible but
//! unlocked until the runner finally exits.

pub mod runner;

use std::io::{self, Write};
use std::process::{Command, Stdio};

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::lock;
use crate::store::{KeyFactory, RecordName, RecordStore};

pub struct Sequencer<'a> {
    store: &'a RecordStore,
    config: &'a QueueConfig,
}

impl<'a> Sequencer<'a> {
    pub fn new(store: &'a RecordStore, config: &'a QueueConfig) -> Self {
        Self { store, config }
    }

    /// Queue `command` and return its assigned record name.
    ///
    /// On return the record is published, locked, and flushed; the caller may
    /// exit immediately (fire-and-forget) or hold on to the name to wait or
    /// tail later.
    pub fn submit(&self, command: &[String]) -> Result<RecordName> {
        let mut keys = KeyFactory::new();
        let (name, file) = loop {
            let name = keys.next();
            match self.store.claim(&name) {
                Ok(file) => break (name, file),
                // Same key already claimed; derive the next one and retry.
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(QueueError::ClaimFailed {
                        name: name.to_string(),
                        source: e,
                    });
                }
            }
        };

        // Nobody else can see the hidden record, so this never blocks.
        lock::lock_exclusive(&file).map_err(|e| QueueError::RecordIo {
            name: name.to_string(),
            source: e,
        })?;

        self.store.publish(&name).map_err(|e| QueueError::RecordIo {
            name: name.to_string(),
            source: e,
        })?;

        if let Err(e) = self.spawn_runner(&name, command, &file) {
            // The record is already visible; report the failure into it so
            // the job is not lost silently, then fail the submission.
            let mut file = file;
            let _ = write!(file, "lq: cannot start runner: {e}");
            let _ = write!(file, "\n[exited with status 111.]\n");
            return Err(QueueError::SpawnFailed(e));
        }

        tracing::debug!(record = %name, "job queued");
        Ok(name)
    }

    /// Start the detached runner process, handing it the locked record file
    /// as stdout and stderr. The flock travels with the shared open file
    /// description; once the child is spawned, our own handle can close.
    fn spawn_runner(
        &self,
        name: &RecordName,
        command: &[String],
        file: &std::fs::File,
    ) -> io::Result<()> {
        use std::os::unix::process::CommandExt;

        let exe = std::env::current_exe()?;
        let mut runner = Command::new(exe);
        runner
            .arg("exec")
            .arg("--dir")
            .arg(self.store.dir())
            .arg("--record")
            .arg(name.as_str());
        if self.config.clean {
            runner.arg("--clean");
        }
        if let Some(dir) = &self.config.done_dir {
            runner.arg("--done-dir").arg(dir);
        }
        if let Some(dir) = &self.config.fail_dir {
            runner.arg("--fail-dir").arg(dir);
        }
        runner
            .arg("--")
            .args(command)
            .stdin(Stdio::null())
            .stdout(Stdio::from(file.try_clone()?))
            .stderr(Stdio::from(file.try_clone()?))
            // New process group: the runner and its job must not die with the
            // submitter's terminal session.
            .process_group(0)
            .spawn()?;
        Ok(())
    }
}

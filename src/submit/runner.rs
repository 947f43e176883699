//! The runner: the background continuation of a submission.
//!
//! Spawned by the sequencer with the locked record file as fd 1 and fd 2.
//! Writing the header and trailer therefore goes through plain stdout, the
//! job inherits the same descriptors, and the lock releases exactly when this
//! process exits, after the trailer is flushed and never before.

use std::io::{self, Write};
use std::process::{Command, ExitStatus, Stdio};

use crate::config::QueueConfig;
use crate::error::Result;
use crate::scan::PredecessorScanner;
use crate::shell;
use crate::store::{RecordName, RecordStore};

/// How the job ended, as reported in the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Exited(i32),
    Killed(i32),
}

impl JobOutcome {
    pub fn from_status(status: ExitStatus) -> Self {
        use std::os::unix::process::ExitStatusExt;
        match status.code() {
            Some(code) => JobOutcome::Exited(code),
            // No exit code on Unix means a signal death.
            None => JobOutcome::Killed(status.signal().unwrap_or(0)),
        }
    }

    pub fn success(self) -> bool {
        self == JobOutcome::Exited(0)
    }

    /// The trailer line appended to the record, byte-for-byte the format
    /// followers and humans grep for.
    pub fn trailer(self) -> String {
        match self {
            JobOutcome::Exited(code) => format!("\n[exited with status {code}.]\n"),
            JobOutcome::Killed(signal) => format!("\n[killed by signal {signal}.]\n"),
        }
    }
}

pub struct Runner {
    store: RecordStore,
    config: QueueConfig,
    name: RecordName,
    command: Vec<String>,
}

impl Runner {
    pub fn new(
        store: RecordStore,
        config: QueueConfig,
        name: RecordName,
        command: Vec<String>,
    ) -> Self {
        Self {
            store,
            config,
            name,
            command,
        }
    }

    /// Drive the record through the rest of its lifecycle: header, turn
    /// waiting, the job itself, trailer, post-run policy.
    pub fn run(self) -> Result<()> {
        let mut record = io::stdout();

        // Header first, so followers can show what is queued. Its newline is
        // deferred until the job is actually about to run.
        write!(record, "exec {}", shell::quote_command(&self.command))?;
        record.flush()?;

        PredecessorScanner::new(&self.store, self.name.clone()).wait()?;

        writeln!(record)?;
        record.flush()?;
        if let Err(e) = self.store.set_active_flag(&self.name) {
            tracing::warn!(record = %self.name, error = %e, "cannot mark record active");
        }

        let outcome = self.run_job(&mut record)?;
        record.write_all(outcome.trailer().as_bytes())?;
        record.flush()?;

        if let Err(e) = self.store.clear_active_flag(&self.name) {
            tracing::warn!(record = %self.name, error = %e, "cannot mark record finished");
        }
        self.finalize(outcome);
        Ok(())
    }

    /// Start the job with the record as its stdout/stderr and wait for it.
    /// A spawn failure is the job's failure, not the protocol's: it is
    /// written into the record and mapped to the conventional status 111.
    fn run_job(&self, record: &mut impl Write) -> Result<JobOutcome> {
        let mut job = Command::new(&self.command[0]);
        job.args(&self.command[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        match job.spawn() {
            Ok(mut child) => Ok(JobOutcome::from_status(child.wait()?)),
            Err(e) => {
                write!(record, "lq: {}: {e}", self.command[0])?;
                record.flush()?;
                Ok(JobOutcome::Exited(111))
            }
        }
    }

    /// Apply the post-run relocation policy. Housekeeping only: every error
    /// here is logged and swallowed, the job's own outcome stands.
    fn finalize(&self, outcome: JobOutcome) {
        let result = if outcome.success() {
            if self.config.clean {
                self.store.remove(&self.name)
            } else if let Some(dir) = &self.config.done_dir {
                self.store.relocate(&self.name, dir)
            } else {
                Ok(())
            }
        } else if let Some(dir) = &self.config.fail_dir {
            self.store.relocate(&self.name, dir)
        } else {
            Ok(())
        };
        if let Err(e) = result {
            tracing::warn!(record = %self.name, error = %e, "post-run housekeeping failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailer_format() {
        assert_eq!(JobOutcome::Exited(0).trailer(), "\n[exited with status 0.]\n");
        assert_eq!(JobOutcome::Exited(7).trailer(), "\n[exited with status 7.]\n");
        assert_eq!(JobOutcome::Killed(9).trailer(), "\n[killed by signal 9.]\n");
    }

    #[test]
    fn test_success_is_clean_exit_only() {
        assert!(JobOutcome::Exited(0).success());
        assert!(!JobOutcome::Exited(1).success());
        assert!(!JobOutcome::Killed(15).success());
    }
}

//! Advisory file locks over `flock(2)`.
//!
//! A record's lock is acquired while the record is still hidden, inherited by
//! the runner process through the record file descriptor, and held until that
//! process exits. The kernel releases `flock` locks when the last descriptor
//! for the open file description closes, so a job killed by any signal (or a
//! crashed runner) can never leave its record looking alive. No heartbeat,
//! lease, or timeout exists anywhere in the protocol; presence of the lock is
//! the one and only "still running" signal.

use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;

fn flock(file: &File, operation: libc::c_int) -> io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: flock is a standard POSIX call; fd is a valid descriptor owned
    // by `file` for the duration of the call.
    let rc = unsafe { libc::flock(fd, operation) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Try to take the exclusive lock without blocking.
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if another
/// process holds it.
pub fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    match flock(file, libc::LOCK_EX | libc::LOCK_NB) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}

/// Take the exclusive lock, blocking until the current holder exits.
pub fn lock_exclusive(file: &File) -> io::Result<()> {
    loop {
        match flock(file, libc::LOCK_EX) {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Release a lock taken through this module.
pub fn unlock(file: &File) -> io::Result<()> {
    flock(file, libc::LOCK_UN)
}

/// Liveness probe: a record whose lock can be acquired has no live owner,
/// which by the protocol means the job has finished. The probe lock is
/// released immediately; callers never retain it.
pub fn probe_finished(file: &File) -> io::Result<bool> {
    if try_lock_exclusive(file)? {
        unlock(file)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

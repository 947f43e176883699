use std::path::PathBuf;

/// Where records live and what happens to them after the job exits.
///
/// Resolved once in `main` from flags and environment, then threaded
/// explicitly through every operation. Nothing below `main` reads the
/// environment or the working directory.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Directory holding pending and running records.
    pub queue_dir: PathBuf,
    /// Records of jobs that exited 0 are moved here, if set.
    pub done_dir: Option<PathBuf>,
    /// Records of jobs that exited non-zero or died to a signal are
    /// moved here, if set.
    pub fail_dir: Option<PathBuf>,
    /// Delete the record entirely on a clean (status 0) exit.
    /// Takes precedence over `done_dir`.
    pub clean: bool,
}

impl QueueConfig {
    pub fn new(queue_dir: PathBuf) -> Self {
        Self {
            queue_dir,
            done_dir: None,
            fail_dir: None,
            clean: false,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_queue_dir_is_cwd() {
        let config = QueueConfig::default();
        assert_eq!(config.queue_dir, PathBuf::from("."));
        assert!(config.done_dir.is_none());
        assert!(config.fail_dir.is_none());
        assert!(!config.clean);
    }
}

//! Wake-up strategies for the follower.
//!
//! "The file might have grown" can come from an OS change notification or
//! from a plain timer; the follower does not care which. The strategy is
//! chosen once at startup by platform capability.

use std::io;
use std::path::Path;
use std::time::Duration;

/// Suspend until the given file may have changed. Spurious wake-ups are
/// fine; the follower re-checks the file size after every wake.
pub trait ChangeWatcher {
    fn wait_for_change(&mut self, path: &Path) -> io::Result<()>;
}

/// Fallback strategy: sleep a fixed interval and let the caller re-check.
#[derive(Debug, Clone)]
pub struct IntervalWatcher {
    interval: Duration,
}

impl IntervalWatcher {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for IntervalWatcher {
    fn default() -> Self {
        // Same cadence the polling variant has always used.
        Self::new(Duration::from_millis(250))
    }
}

impl ChangeWatcher for IntervalWatcher {
    fn wait_for_change(&mut self, _path: &Path) -> io::Result<()> {
        std::thread::sleep(self.interval);
        Ok(())
    }
}

#[cfg(target_os = "linux")]
pub use inotify_watcher::InotifyWatcher;

#[cfg(target_os = "linux")]
mod inotify_watcher {
    use super::*;
    use std::path::PathBuf;

    use nix::sys::inotify::{AddWatchFlags, InitFlags, Inotify, WatchDescriptor};

    /// Blocks in `read(2)` on an inotify descriptor until the watched record
    /// is modified or closed by its writer. Any event is a good event.
    pub struct InotifyWatcher {
        inotify: Inotify,
        watched: Option<(PathBuf, WatchDescriptor)>,
        fallback: IntervalWatcher,
    }

    impl InotifyWatcher {
        pub fn new() -> io::Result<Self> {
            let inotify = Inotify::init(InitFlags::empty()).map_err(io::Error::from)?;
            Ok(Self {
                inotify,
                watched: None,
                fallback: IntervalWatcher::default(),
            })
        }

        fn rewatch(&mut self, path: &Path) -> io::Result<()> {
            if let Some((current, wd)) = self.watched.take() {
                if current == path {
                    self.watched = Some((current, wd));
                    return Ok(());
                }
                let _ = self.inotify.rm_watch(wd);
            }
            let wd = self
                .inotify
                .add_watch(path, AddWatchFlags::IN_MODIFY | AddWatchFlags::IN_CLOSE_WRITE)
                .map_err(io::Error::from)?;
            self.watched = Some((path.to_path_buf(), wd));
            Ok(())
        }
    }

    impl ChangeWatcher for InotifyWatcher {
        fn wait_for_change(&mut self, path: &Path) -> io::Result<()> {
            // The record can be relocated out from under us between the size
            // check and the watch registration; fall back to a timer tick
            // and let the caller's lock probe settle it.
            if self.rewatch(path).is_err() {
                return self.fallback.wait_for_change(path);
            }
            self.inotify.read_events().map_err(io::Error::from)?;
            Ok(())
        }
    }
}

/// The best available strategy for this platform.
pub fn default_watcher() -> Box<dyn ChangeWatcher> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(watcher) = InotifyWatcher::new() {
            return Box::new(watcher);
        }
    }
    Box::new(IntervalWatcher::default())
}

//! Record names and the submission key embedded in them.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Visible records start with this byte.
pub const VISIBLE_PREFIX: char = ',';
/// Extra prefix carried only during the atomic-claim window.
pub const HIDDEN_PREFIX: char = '.';

/// The name of a visible record: `,` + 13-digit zero-padded hex millisecond
/// timestamp + `.` + decimal pid of the claiming process.
///
/// The submission key IS the name: zero padding makes byte-wise comparison of
/// names agree with numeric comparison of timestamps, and the pid suffix keeps
/// names unique (and still totally ordered, if arbitrarily so) when two
/// processes claim within the same millisecond. The derived `Ord` on the inner
/// string is therefore the queue order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordName(String);

impl RecordName {
    pub fn from_parts(millis: u64, pid: u32) -> Self {
        Self(format!("{VISIBLE_PREFIX}{millis:013x}.{pid}"))
    }

    /// Accept a directory entry as a visible record name.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() > 1 && s.starts_with(VISIBLE_PREFIX) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The intermediate name used between claim and publish. Scanners and
    /// followers never match it: it does not start with `,`.
    pub fn hidden(&self) -> String {
        format!("{HIDDEN_PREFIX}{}", self.0)
    }

    /// A reference name for "everything queued so far": sorts after every
    /// record claimed up to and including the current millisecond, so a
    /// same-millisecond submission can never dodge a wait on it.
    pub fn horizon() -> Self {
        Self::from_parts(now_millis() + 1, 0)
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Issues record names with strictly increasing keys.
///
/// Within one process the millisecond component is bumped past the last
/// issued value whenever the clock has not advanced, so back-to-back
/// submissions can never collide or reorder. Across processes, uniqueness at
/// the same millisecond comes from the pid suffix instead.
#[derive(Debug)]
pub struct KeyFactory {
    last_millis: u64,
    pid: u32,
}

impl KeyFactory {
    pub fn new() -> Self {
        Self {
            last_millis: 0,
            pid: std::process::id(),
        }
    }

    pub fn next(&mut self) -> RecordName {
        let mut millis = now_millis();
        if millis <= self.last_millis {
            millis = self.last_millis + 1;
        }
        self.last_millis = millis;
        RecordName::from_parts(millis, self.pid)
    }
}

impl Default for KeyFactory {
    fn default() -> Self {
        Self::new()
    }
}

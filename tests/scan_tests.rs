use std::fs::File;
use std::os::unix::fs::PermissionsExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lq::lock;
use lq::scan::{self, PredecessorScanner, Readiness};
use lq::store::{RecordName, RecordStore};

fn published(store: &RecordStore, millis: u64, pid: u32) -> RecordName {
    let name = RecordName::from_parts(millis, pid);
    store.claim(&name).unwrap();
    store.publish(&name).unwrap();
    name
}

/// Hold the record's lock the way a running job does: through a separate
/// open file description, released when the returned handle drops.
fn hold_lock(store: &RecordStore, name: &RecordName) -> File {
    let file = File::open(store.path(name)).unwrap();
    assert!(lock::try_lock_exclusive(&file).unwrap());
    file
}

#[derive(Clone)]
struct LogSink(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Run a closure with warn-level logging captured into a buffer.
fn captured_warnings<F: FnOnce()>(f: F) -> String {
    let sink = LogSink(Arc::new(Mutex::new(Vec::new())));
    let buf = Arc::clone(&sink.0);
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || sink.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    let bytes = buf.lock().unwrap();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[test]
fn test_poll_ready_when_all_predecessors_finished() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    for millis in [1000u64, 2000, 3000] {
        published(&store, millis, 1);
    }

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    assert_eq!(scanner.poll().unwrap(), Readiness::Ready);
}

#[test]
fn test_poll_reports_running_predecessor_without_blocking() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    published(&store, 1000, 1);
    let running = published(&store, 2000, 1);
    let _held = hold_lock(&store, &running);

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    let started = Instant::now();
    assert_eq!(scanner.poll().unwrap(), Readiness::Blocked(running));
    // Never blocks, no matter how long the job would run.
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_poll_ignores_successors() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let newer = published(&store, 9000, 1);
    let _held = hold_lock(&store, &newer);

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(2000, 1));
    assert_eq!(scanner.poll().unwrap(), Readiness::Ready);
}

#[test]
fn test_poll_clears_active_flag_of_finished_predecessor() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let name = published(&store, 1000, 1);
    store.set_active_flag(&name).unwrap();

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    assert_eq!(scanner.poll().unwrap(), Readiness::Ready);

    let mode = std::fs::metadata(store.path(&name)).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn test_wait_returns_immediately_when_queue_is_clear() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    for millis in [1000u64, 2000, 3000] {
        published(&store, millis, 1);
    }

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    let started = Instant::now();
    scanner.wait().unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_wait_blocks_until_running_predecessor_releases() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    // Several finished predecessors plus one running: the wait must hinge
    // on the running one only.
    for millis in [1000u64, 2000, 3000] {
        published(&store, millis, 1);
    }
    let running = published(&store, 4000, 1);
    let held = hold_lock(&store, &running);

    let holder = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        drop(held);
    });

    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    let started = Instant::now();
    scanner.wait().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));
    holder.join().unwrap();
}

/// Park a wait on one held record while a second thread publishes another
/// record below the reference and then releases the held lock, forcing a
/// rescan that meets the newcomer. Returns the captured warn-level log.
fn wait_through_late_arrival(store: &RecordStore, scanner: &PredecessorScanner) -> String {
    let running = published(store, 1000, 1);
    let held = hold_lock(store, &running);

    let dir = store.dir().to_path_buf();
    let publisher = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(150));
        let store = RecordStore::open(&dir).unwrap();
        published(&store, 1500, 1);
        drop(held);
    });

    let log = captured_warnings(|| scanner.wait().unwrap());
    publisher.join().unwrap();
    log
}

#[test]
fn test_late_record_during_queue_wide_wait_is_not_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let scanner = PredecessorScanner::for_horizon(&store);
    let log = wait_through_late_arrival(&store, &scanner);
    assert!(!log.contains("key order violated"), "{log}");
}

#[test]
fn test_late_record_below_a_record_reference_is_flagged() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let scanner = PredecessorScanner::new(&store, RecordName::from_parts(9000, 1));
    let log = wait_through_late_arrival(&store, &scanner);
    assert!(log.contains("key order violated"), "{log}");
}

#[test]
fn test_wait_named_skips_missing_records() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let gone = RecordName::from_parts(1234, 5);
    // Already relocated or deleted: treated as finished, never an error.
    scan::wait_named(&store, &[gone]).unwrap();
}

#[test]
fn test_test_named_reports_the_locked_record() {
    let dir = tempfile::tempdir().unwrap();
    let store = RecordStore::open(dir.path()).unwrap();
    let finished = published(&store, 1000, 1);
    let running = published(&store, 2000, 1);
    let _held = hold_lock(&store, &running);

    assert_eq!(
        scan::test_named(&store, &[finished.clone()]).unwrap(),
        Readiness::Ready
    );
    assert_eq!(
        scan::test_named(&store, &[finished, running.clone()]).unwrap(),
        Readiness::Blocked(running)
    );
}

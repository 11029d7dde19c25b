//! Proc filesystem polling source.
//!
//! Scans `<proc_root>` on a dedicated thread, diffing the numeric pid
//! directories between scans:
//!   new pid  → `Created` (parent from `<pid>/stat`, image from `<pid>/exe`)
//!   gone pid → `Exited`
//!
//! The scan taken at subscribe time is a baseline and reports nothing.
//! Processes that start and exit between two scans are never seen.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::events::{EventSourceAdapter, ProcessNotification};
use crate::source::ProcessNotifier;
use crate::types::{Error, ProcessId, Result, SourceConfig};

#[derive(Debug)]
struct Worker {
    stop_tx: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Polling notifier over the proc filesystem.
#[derive(Debug)]
pub struct ProcfsNotifier {
    proc_root: PathBuf,
    poll_interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl ProcfsNotifier {
    pub fn new(proc_root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            proc_root: proc_root.into(),
            poll_interval,
            worker: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SourceConfig) -> Self {
        Self::new(config.proc_root.clone(), config.poll_interval)
    }
}

impl ProcessNotifier for ProcfsNotifier {
    fn subscribe(&self, adapter: Arc<EventSourceAdapter>) -> Result<()> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(Error::state_transition("procfs notifier already subscribed"));
        }

        let baseline = scan_pids(&self.proc_root)?;
        let (stop_tx, stop_rx) = mpsc::channel();
        let root = self.proc_root.clone();
        let interval = self.poll_interval;

        tracing::info!(
            "procfs source watching {} every {:?} ({} existing pids)",
            root.display(),
            interval,
            baseline.len()
        );

        let thread = thread::Builder::new()
            .name("procrelay-procfs".to_string())
            .spawn(move || poll_loop(&root, interval, baseline, &adapter, &stop_rx))?;

        *worker = Some(Worker { stop_tx, thread });
        Ok(())
    }

    fn unsubscribe(&self) -> Result<()> {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Ok(());
        };

        // A send error only means the thread already exited.
        let _ = worker.stop_tx.send(());
        worker
            .thread
            .join()
            .map_err(|_| Error::internal("procfs poll thread panicked"))
    }
}

fn poll_loop(
    root: &Path,
    interval: Duration,
    mut known: BTreeSet<u64>,
    adapter: &EventSourceAdapter,
    stop_rx: &mpsc::Receiver<()>,
) {
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        let current = match scan_pids(root) {
            Ok(pids) => pids,
            Err(e) => {
                tracing::warn!("procfs scan of {} failed: {}", root.display(), e);
                continue;
            }
        };

        for &pid in current.difference(&known) {
            if let Some(notification) = read_created(root, pid) {
                adapter.on_notification(notification);
            }
        }
        for &pid in known.difference(&current) {
            adapter.on_notification(ProcessNotification::Exited {
                process_id: ProcessId::new(pid),
            });
        }

        known = current;
    }
    tracing::debug!("procfs poll thread stopped");
}

/// Numeric directory names under `root`.
pub(crate) fn scan_pids(root: &Path) -> std::io::Result<BTreeSet<u64>> {
    let mut pids = BTreeSet::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse().ok()) {
            pids.insert(pid);
        }
    }
    Ok(pids)
}

/// Build a creation notification for `pid`, or `None` if it already exited.
pub(crate) fn read_created(root: &Path, pid: u64) -> Option<ProcessNotification> {
    let dir = root.join(pid.to_string());
    let stat = std::fs::read_to_string(dir.join("stat")).ok()?;
    let parent = parse_parent_pid(&stat)?;
    // Kernel threads and processes we may not inspect have no readable exe.
    let image_path = std::fs::read_link(dir.join("exe"))
        .ok()
        .map(|p| p.to_string_lossy().into_owned());

    Some(ProcessNotification::Created {
        process_id: ProcessId::new(pid),
        parent_process_id: ProcessId::new(parent),
        image_path,
    })
}

/// Parent pid from a `stat` line: `pid (comm) state ppid ...`.
///
/// `comm` may itself contain spaces and parentheses, so fields are counted
/// from the last `)`.
pub(crate) fn parse_parent_pid(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let _state = fields.next()?;
    fields.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::slot::{Registration, RendezvousSlot};
    use std::fs;

    fn fake_process(root: &Path, pid: u64, ppid: u64, exe: Option<&str>) {
        // Populate outside the scanned namespace, then rename into place so the
        // poll thread never sees a half-written pid directory.
        let staging = root.join(format!(".staging-{pid}"));
        fs::create_dir_all(&staging).unwrap();
        fs::write(
            staging.join("stat"),
            format!("{pid} (fake proc) S {ppid} {pid} {pid} 0 -1 4194560\n"),
        )
        .unwrap();
        if let Some(exe) = exe {
            link_exe(exe, &staging.join("exe"));
        }
        fs::rename(&staging, root.join(pid.to_string())).unwrap();
    }

    #[cfg(unix)]
    fn link_exe(target: &str, at: &Path) {
        std::os::unix::fs::symlink(target, at).unwrap();
    }

    #[cfg(not(unix))]
    fn link_exe(_target: &str, _at: &Path) {}

    #[test]
    fn test_parse_parent_pid() {
        assert_eq!(parse_parent_pid("42 (bash) S 1 42 42 0"), Some(1));
        assert_eq!(parse_parent_pid("7 (a) b (c)) R 3 7 7"), Some(3));
        assert_eq!(parse_parent_pid("garbage"), None);
        assert_eq!(parse_parent_pid("9 (x) S"), None);
    }

    #[test]
    fn test_scan_ignores_non_numeric_entries() {
        let root = tempfile::tempdir().unwrap();
        fake_process(root.path(), 1, 0, None);
        fake_process(root.path(), 300, 1, None);
        fs::create_dir(root.path().join("self")).unwrap();
        fs::write(root.path().join("version"), "Linux").unwrap();

        let pids = scan_pids(root.path()).unwrap();
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![1, 300]);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_created_reports_parent_and_image() {
        let root = tempfile::tempdir().unwrap();
        fake_process(root.path(), 77, 42, Some("/usr/bin/sleep"));

        let notification = read_created(root.path(), 77).unwrap();
        assert_eq!(
            notification,
            ProcessNotification::Created {
                process_id: ProcessId::new(77),
                parent_process_id: ProcessId::new(42),
                image_path: Some("/usr/bin/sleep".to_string()),
            }
        );
        assert_eq!(read_created(root.path(), 78), None);
    }

    #[test]
    fn test_subscribe_fails_for_missing_root() {
        let slot = Arc::new(RendezvousSlot::new());
        let notifier = ProcfsNotifier::new("/nonexistent/proc", Duration::from_millis(10));
        let err = notifier
            .subscribe(Arc::new(EventSourceAdapter::new(&slot)))
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_new_pid_is_delivered_and_baseline_is_not() {
        let root = tempfile::tempdir().unwrap();
        fake_process(root.path(), 1, 0, Some("/sbin/init"));

        let slot = Arc::new(RendezvousSlot::new());
        let notifier = ProcfsNotifier::new(root.path(), Duration::from_millis(10));
        notifier
            .subscribe(Arc::new(EventSourceAdapter::new(&slot)))
            .unwrap();

        let Registration::Registered(handle) = slot.try_register() else {
            panic!("slot unexpectedly busy");
        };
        fake_process(root.path(), 500, 1, Some("/usr/bin/sleep"));

        let event = tokio::time::timeout(Duration::from_secs(5), handle.wait())
            .await
            .expect("no event within 5s")
            .unwrap();
        assert_eq!(event.process_id, ProcessId::new(500));
        assert_eq!(event.parent_process_id, ProcessId::new(1));
        assert_eq!(event.image_name.to_string(), "/usr/bin/sleep");

        notifier.unsubscribe().unwrap();
        notifier.unsubscribe().unwrap();
    }
}

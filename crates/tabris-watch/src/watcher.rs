//! Reload watcher.
//!
//! Bridges notify events for observed paths through the debouncer into a
//! reload command for the current debug session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tabris_session::CommandSender;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};

use crate::debouncer::{Change, ChangeDebouncer, ChangeKind};
use crate::error::WatchError;
use crate::watch_set::WatchSet;

/// Command that makes the runtime reload the app.
pub const RELOAD_COMMAND: &str = "tabris.app.reload()";

/// Default quiet window before a reload is issued.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

const NOTICE_CAPACITY: usize = 16;

/// Published after a reload command was delivered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadNotice {
    /// File whose change triggered the reload.
    pub path: PathBuf,
}

impl fmt::Display for ReloadNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' changed, reloading app...", self.path.display())
    }
}

/// State shared with the notify callback.
#[derive(Default)]
struct Shared {
    watch_set: Mutex<WatchSet>,
    /// Present while the pipeline is started.
    changes: Mutex<Option<mpsc::UnboundedSender<Change>>>,
}

impl Shared {
    fn watch_set(&self) -> MutexGuard<'_, WatchSet> {
        self.watch_set.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn changes(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Change>>> {
        self.changes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn forward(&self, event: Event) {
        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Modify(_) => ChangeKind::Modified,
            EventKind::Remove(_) => ChangeKind::Removed,
            _ => return,
        };
        let changes = self.changes();
        let Some(tx) = changes.as_ref() else {
            return;
        };
        for path in event.paths {
            let _ = tx.send(Change { path, kind });
        }
    }
}

/// Watches files delivered to the device and reloads the app when one of
/// them changes.
pub struct ReloadWatcher {
    shared: Arc<Shared>,
    fs: Mutex<RecommendedWatcher>,
    sender: Arc<dyn CommandSender>,
    debounce: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
    notices: broadcast::Sender<ReloadNotice>,
}

impl ReloadWatcher {
    /// Create a stopped watcher that reloads through `sender`.
    pub fn new(sender: Arc<dyn CommandSender>, debounce: Duration) -> Result<Self, WatchError> {
        let shared = Arc::new(Shared::default());
        let callback_shared = Arc::clone(&shared);
        let fs = notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
            Ok(event) => callback_shared.forward(event),
            Err(e) => tracing::warn!(error = %e, "File watcher error"),
        })
        .map_err(WatchError::Init)?;

        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Ok(Self {
            shared,
            fs: Mutex::new(fs),
            sender,
            debounce,
            task: Mutex::new(None),
            notices,
        })
    }

    /// Mark `path` as in use by the device.
    ///
    /// Idempotent. Arms a watch on the containing directory (or the path
    /// itself for a directory) unless one is already armed.
    pub fn observe(&self, path: &Path) -> Result<(), WatchError> {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let is_dir = path.is_dir();

        let mut watch_set = self.shared.watch_set();
        let Some(dir) = watch_set.insert(path, is_dir) else {
            return Ok(());
        };

        self.lock_fs()
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: dir.clone(),
                source,
            })?;
        tracing::debug!(dir = %dir.display(), "Armed file watch");
        watch_set.arm(dir);
        Ok(())
    }

    /// Start turning changes into reload commands. No-op if started.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&self) {
        let mut task = self.lock_task();
        if task.is_some() {
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.changes() = Some(tx);

        let pipeline = Pipeline {
            shared: Arc::clone(&self.shared),
            sender: Arc::clone(&self.sender),
            notices: self.notices.clone(),
            debouncer: ChangeDebouncer::new(self.debounce),
        };
        *task = Some(tokio::spawn(pipeline.run(rx)));
        tracing::debug!(debounce_ms = self.debounce.as_millis(), "Reload watcher started");
    }

    /// Stop the pipeline and drop every watch. Idempotent.
    ///
    /// No reload is issued after this returns.
    pub fn stop(&self) {
        *self.shared.changes() = None;
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }

        let armed = self.shared.watch_set().clear();
        let mut fs = self.lock_fs();
        for dir in armed {
            if let Err(e) = fs.unwatch(&dir) {
                tracing::debug!(dir = %dir.display(), error = %e, "Failed to unwatch");
            }
        }
    }

    /// Subscribe to notices of delivered reloads.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadNotice> {
        self.notices.subscribe()
    }

    /// Returns `true` if a watch is armed on `dir`.
    pub fn is_armed(&self, dir: &Path) -> bool {
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        self.shared.watch_set().is_armed(&dir)
    }

    /// Number of armed directory watches.
    pub fn armed_count(&self) -> usize {
        self.shared.watch_set().armed_count()
    }

    fn lock_fs(&self) -> MutexGuard<'_, RecommendedWatcher> {
        self.fs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn inject(&self, path: &Path, kind: ChangeKind) {
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        if let Some(tx) = self.shared.changes().as_ref() {
            let _ = tx.send(Change { path, kind });
        }
    }
}

impl Drop for ReloadWatcher {
    fn drop(&mut self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }
}

/// Background half of a started watcher.
struct Pipeline {
    shared: Arc<Shared>,
    sender: Arc<dyn CommandSender>,
    notices: broadcast::Sender<ReloadNotice>,
    debouncer: ChangeDebouncer,
}

impl Pipeline {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Change>) {
        loop {
            let deadline = self.debouncer.next_deadline();
            tokio::select! {
                change = rx.recv() => {
                    let Some(change) = change else { break };
                    if self.shared.watch_set().contains(&change.path) {
                        tracing::debug!(path = %change.path.display(), kind = ?change.kind, "Recorded change");
                        self.debouncer.record(change.path, change.kind);
                    }
                }
                () = wait_until(deadline) => {
                    let batch = self.debouncer.drain_ready();
                    self.reload(&batch);
                }
            }
        }
        self.debouncer.clear();
    }

    /// Issue one reload for a settled batch of changes.
    fn reload(&self, batch: &[Change]) {
        // Deleted files are not reloaded.
        let Some(changed) = batch
            .iter()
            .find(|change| change.kind != ChangeKind::Removed && change.path.exists())
        else {
            return;
        };

        // Cleared by `stop`; held across the send so none follows it.
        let changes = self.shared.changes();
        if changes.is_none() {
            return;
        }
        let sent = self.sender.send(RELOAD_COMMAND);
        drop(changes);
        if !sent {
            tracing::debug!(path = %changed.path.display(), "No device connected, reload skipped");
            return;
        }

        let notice = ReloadNotice {
            path: changed.path.clone(),
        };
        tracing::info!("{notice}");
        let _ = self.notices.send(notice);
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};

    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::time::sleep;

    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    /// Records every command and reports a configurable connection state.
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
        connected: AtomicBool,
    }

    impl RecordingSender {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl CommandSender for RecordingSender {
        fn send(&self, command: &str) -> bool {
            if !self.connected.load(Ordering::SeqCst) {
                return false;
            }
            self.sent.lock().unwrap().push(command.to_owned());
            true
        }
    }

    fn project() -> (TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("app.js"), "console.log('a')").unwrap();
        fs::write(root.join("other.js"), "console.log('b')").unwrap();
        fs::create_dir(root.join("lib")).unwrap();
        fs::write(root.join("lib/util.js"), "module.exports = {}").unwrap();
        (dir, root)
    }

    fn started(sender: &Arc<RecordingSender>) -> ReloadWatcher {
        let watcher =
            ReloadWatcher::new(Arc::clone(sender) as Arc<dyn CommandSender>, WINDOW).unwrap();
        watcher.start();
        watcher
    }

    async fn settle() {
        sleep(WINDOW + Duration::from_millis(10)).await;
    }

    fn pipeline(sender: &Arc<RecordingSender>) -> Pipeline {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Pipeline {
            shared: Arc::new(Shared::default()),
            sender: Arc::clone(sender) as Arc<dyn CommandSender>,
            notices,
            debouncer: ChangeDebouncer::new(WINDOW),
        }
    }

    #[test]
    fn test_stopped_pipeline_does_not_reload() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let pipeline = pipeline(&sender);
        let batch = [Change {
            path: root.join("app.js"),
            kind: ChangeKind::Modified,
        }];

        // No change channel: the watcher was stopped.
        pipeline.reload(&batch);
        assert!(sender.sent().is_empty());

        let (tx, _rx) = mpsc::unbounded_channel();
        *pipeline.shared.changes() = Some(tx);
        pipeline.reload(&batch);
        assert_eq!(sender.sent(), vec![RELOAD_COMMAND.to_owned()]);
    }

    #[test]
    fn test_notice_message() {
        let notice = ReloadNotice {
            path: PathBuf::from("/app/src/app.js"),
        };
        assert_eq!(
            notice.to_string(),
            "'/app/src/app.js' changed, reloading app..."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_observe_twice_arms_one_watch() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);

        watcher.observe(&root.join("app.js")).unwrap();
        watcher.observe(&root.join("app.js")).unwrap();
        watcher.observe(&root.join("other.js")).unwrap();

        assert_eq!(watcher.armed_count(), 1);
        assert!(watcher.is_armed(&root));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_to_observed_file_sends_reload() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        let mut notices = watcher.subscribe();
        let app = root.join("app.js");

        watcher.observe(&app).unwrap();
        watcher.inject(&app, ChangeKind::Modified);
        settle().await;

        assert_eq!(sender.sent(), vec![RELOAD_COMMAND.to_owned()]);
        assert_eq!(notices.try_recv().unwrap(), ReloadNotice { path: app });
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_within_window_sends_one_reload() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();
        watcher.observe(&root.join("other.js")).unwrap();

        for _ in 0..5 {
            watcher.inject(&app, ChangeKind::Modified);
            sleep(Duration::from_millis(300)).await;
        }
        watcher.inject(&root.join("other.js"), ChangeKind::Modified);

        // Nothing yet: the window restarts with every change.
        assert!(sender.sent().is_empty());

        settle().await;
        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_spaced_beyond_window_send_each() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();

        for _ in 0..3 {
            watcher.inject(&app, ChangeKind::Modified);
            settle().await;
        }

        assert_eq!(sender.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_file_never_reloads() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        watcher.observe(&root.join("app.js")).unwrap();

        watcher.inject(&root.join("other.js"), ChangeKind::Modified);
        settle().await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_file_does_not_reload() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();

        fs::remove_file(&app).unwrap();
        watcher.inject(&app, ChangeKind::Removed);
        settle().await;

        assert!(sender.sent().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_of_observed_directory_reloads() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);

        watcher.observe(&root.join("lib")).unwrap();
        watcher.inject(&root.join("lib/util.js"), ChangeKind::Modified);
        settle().await;

        assert_eq!(sender.sent(), vec![RELOAD_COMMAND.to_owned()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_notice_without_device() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        sender.connected.store(false, Ordering::SeqCst);
        let watcher = started(&sender);
        let mut notices = watcher.subscribe();
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();

        watcher.inject(&app, ChangeKind::Modified);
        settle().await;

        assert!(notices.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reload() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();

        watcher.inject(&app, ChangeKind::Modified);
        sleep(Duration::from_millis(100)).await;
        watcher.stop();
        watcher.stop();
        settle().await;

        assert!(sender.sent().is_empty());
        assert_eq!(watcher.armed_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher = started(&sender);
        watcher.stop();
        watcher.start();

        let app = root.join("app.js");
        watcher.observe(&app).unwrap();
        watcher.inject(&app, ChangeKind::Modified);
        settle().await;

        assert_eq!(sender.sent().len(), 1);
    }

    #[tokio::test]
    #[ignore = "depends on filesystem notification timing"]
    async fn test_real_file_write_reloads() {
        let (_dir, root) = project();
        let sender = RecordingSender::new();
        let watcher =
            ReloadWatcher::new(Arc::clone(&sender) as Arc<dyn CommandSender>, Duration::from_millis(200))
                .unwrap();
        watcher.start();
        let app = root.join("app.js");
        watcher.observe(&app).unwrap();

        fs::write(&app, "console.log('changed')").unwrap();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(sender.sent(), vec![RELOAD_COMMAND.to_owned()]);
    }
}

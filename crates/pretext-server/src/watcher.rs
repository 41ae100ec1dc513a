//! File watching for `pretext view --watch`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use pretext_project::Project;
use tokio::sync::mpsc as async_mpsc;

/// Repeated events for one path inside this window are dropped.
const DEBOUNCE: Duration = Duration::from_millis(100);

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

/// A change below one of the watched directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the change touches PreTeXt markup and calls for a rebuild.
    pub fn is_source(&self) -> bool {
        self.kind != ChangeKind::Deleted
            && matches!(
                self.path.extension().and_then(|e| e.to_str()),
                Some("ptx" | "xml")
            )
    }
}

/// Keeps the underlying notify watcher alive; events arrive on the paired receiver.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Watch `paths` recursively, skipping anything under `ignored`.
    pub fn new(
        paths: &[PathBuf],
        ignored: Vec<PathBuf>,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let (raw_tx, raw_rx) = mpsc::channel();
        let (tx, rx) = async_mpsc::channel(100);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(std::io::Error::other)?;

        for path in paths.iter().filter(|p| p.exists()) {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .map_err(std::io::Error::other)?;
        }

        std::thread::spawn(move || forward(raw_rx, tx, &ignored));
        Ok((Self { _watcher: watcher }, rx))
    }

    /// Watch the source and publication directories of `project`.
    ///
    /// Output and the generated-asset cache are ignored so that a rebuild
    /// does not trigger another one.
    pub fn for_project(
        project: &Project,
    ) -> Result<(Self, async_mpsc::Receiver<WatchEvent>), std::io::Error> {
        let mut paths = vec![project.source_abspath(), project.publication_abspath()];
        paths.dedup();
        let ignored = vec![project.output_dir_abspath(), project.generated_cache_abspath()];
        Self::new(&paths, ignored)
    }
}

/// Move raw notify events onto the async channel until either side closes.
fn forward(
    raw: mpsc::Receiver<notify::Event>,
    tx: async_mpsc::Sender<WatchEvent>,
    ignored: &[PathBuf],
) {
    let mut last_seen: HashMap<PathBuf, Instant> = HashMap::new();
    while let Ok(event) = raw.recv() {
        let Some(kind) = change_kind(&event.kind) else {
            continue;
        };
        let now = Instant::now();
        for path in event.paths {
            if ignored.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }
            if last_seen
                .get(&path)
                .is_some_and(|seen| now.duration_since(*seen) < DEBOUNCE)
            {
                continue;
            }
            last_seen.insert(path.clone(), now);
            if tx.blocking_send(WatchEvent { path, kind }).is_err() {
                return;
            }
        }
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Deleted),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, ModifyKind, RemoveKind};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn event(path: &str, kind: ChangeKind) -> WatchEvent {
        WatchEvent {
            path: PathBuf::from(path),
            kind,
        }
    }

    #[test]
    fn maps_notify_kinds() {
        assert_eq!(
            change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(ChangeKind::Modified)
        );
        assert_eq!(
            change_kind(&EventKind::Create(CreateKind::File)),
            Some(ChangeKind::Created)
        );
        assert_eq!(
            change_kind(&EventKind::Remove(RemoveKind::File)),
            Some(ChangeKind::Deleted)
        );
        assert_eq!(change_kind(&EventKind::Any), None);
    }

    #[test]
    fn only_markup_changes_are_sources() {
        assert!(event("source/ch1.ptx", ChangeKind::Modified).is_source());
        assert!(event("publication/publication.xml", ChangeKind::Created).is_source());
        assert!(!event("source/ch1.ptx", ChangeKind::Deleted).is_source());
        assert!(!event("assets/a.png", ChangeKind::Modified).is_source());
    }

    #[tokio::test]
    async fn reports_new_files() {
        let temp = tempdir().unwrap();
        let (watcher, mut rx) = FileWatcher::new(&[temp.path().to_path_buf()], Vec::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(temp.path().join("main.ptx"), "<pretext/>").unwrap();
        let received = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;

        drop(watcher);
        let received = received.expect("timed out waiting for a watch event");
        assert!(received.is_some(), "channel closed early");
    }

    #[tokio::test]
    async fn skips_ignored_directories() {
        let temp = tempdir().unwrap();
        let output = temp.path().join("output");
        fs::create_dir(&output).unwrap();

        let (watcher, mut rx) =
            FileWatcher::new(&[temp.path().to_path_buf()], vec![output.clone()]).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        fs::write(output.join("index.html"), "built").unwrap();
        let received = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await;

        drop(watcher);
        assert!(received.is_err(), "output changes should not be reported");
    }
}

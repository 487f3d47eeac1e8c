//! Whitelist store
//!
//! The whitelist is persisted as a JSON array of XUIDs. Membership is unique:
//! duplicates left behind in an older file are collapsed when it is opened.
//!
//! Writers are serialized by an async gate held across mutate-and-persist, and
//! a change only becomes visible once it has been written to disk. Readers get
//! an `Arc` snapshot and never wait on file I/O.

use crate::error::{AutomodError, AutomodResult};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Persistent set of whitelisted XUIDs
#[derive(Clone)]
pub struct AllowList {
    inner: Arc<AllowListInner>,
}

struct AllowListInner {
    path: PathBuf,
    snapshot: RwLock<Arc<Vec<String>>>,
    write_gate: Mutex<()>,
}

impl std::fmt::Debug for AllowList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllowList")
            .field("path", &self.inner.path)
            .field("entries", &self.snapshot().len())
            .finish()
    }
}

impl AllowList {
    /// Open the whitelist at `path`, creating an empty one if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Persistence` if the file cannot be read, parsed,
    /// or created.
    pub async fn open(path: impl Into<PathBuf>) -> AutomodResult<Self> {
        let path = path.into();

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let raw: Vec<String> = serde_json::from_str(&content).map_err(|e| {
                    AutomodError::Persistence(format!("Malformed {}: {e}", path.display()))
                })?;
                let raw_len = raw.len();
                let entries = dedup(raw);
                if entries.len() != raw_len {
                    warn!(
                        "{} contained {} duplicate entries, rewriting",
                        path.display(),
                        raw_len - entries.len()
                    );
                    write_atomically(&path, &entries).await?;
                }
                entries
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} not found! Creating now...", path.display());
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AutomodError::Persistence(format!(
                            "Failed to create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                write_atomically(&path, &[]).await?;
                info!("{} created!", path.display());
                Vec::new()
            }
            Err(e) => {
                return Err(AutomodError::Persistence(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(Self {
            inner: Arc::new(AllowListInner {
                path,
                snapshot: RwLock::new(Arc::new(entries)),
                write_gate: Mutex::new(()),
            }),
        })
    }

    /// Path of the backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Current contents, in insertion order
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<String>> {
        Arc::clone(
            &self
                .inner
                .snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    #[must_use]
    pub fn contains(&self, xuid: &str) -> bool {
        self.snapshot().iter().any(|entry| entry == xuid)
    }

    /// All whitelisted XUIDs, in insertion order
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.snapshot().as_ref().clone()
    }

    /// Add a XUID. Returns `false` if it was already present.
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Persistence` if the change cannot be saved; the
    /// whitelist is left unchanged in that case.
    pub async fn add(&self, xuid: &str) -> AutomodResult<bool> {
        let _gate = self.inner.write_gate.lock().await;

        let current = self.snapshot();
        if current.iter().any(|entry| entry == xuid) {
            return Ok(false);
        }

        let mut next = current.as_ref().clone();
        next.push(xuid.to_string());
        self.commit(next).await?;
        Ok(true)
    }

    /// Remove every entry for a XUID. Returns `false` if it was not present.
    ///
    /// # Errors
    ///
    /// Returns `AutomodError::Persistence` if the change cannot be saved; the
    /// whitelist is left unchanged in that case.
    pub async fn remove(&self, xuid: &str) -> AutomodResult<bool> {
        let _gate = self.inner.write_gate.lock().await;

        let current = self.snapshot();
        if !current.iter().any(|entry| entry == xuid) {
            return Ok(false);
        }

        let next: Vec<String> = current
            .iter()
            .filter(|entry| *entry != xuid)
            .cloned()
            .collect();
        self.commit(next).await?;
        Ok(true)
    }

    /// Persist then publish. Caller must hold the write gate.
    async fn commit(&self, next: Vec<String>) -> AutomodResult<()> {
        write_atomically(&self.inner.path, &next).await?;
        *self
            .inner
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        Ok(())
    }
}

fn dedup(entries: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect()
}

/// Write to a sibling temp file and rename it over the target
async fn write_atomically(path: &Path, entries: &[String]) -> AutomodResult<()> {
    let json = serde_json::to_string(entries)
        .map_err(|e| AutomodError::Persistence(format!("Failed to serialize whitelist: {e}")))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, json).await.map_err(|e| {
        AutomodError::Persistence(format!("Failed to write {}: {e}", tmp.display()))
    })?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(AutomodError::Persistence(format!(
            "Failed to replace {}: {e}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn read_file(path: &Path) -> Vec<String> {
        let content = tokio::fs::read_to_string(path).await.expect("read");
        serde_json::from_str(&content).expect("parse")
    }

    #[tokio::test]
    async fn test_open_creates_empty_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("data").join("whitelist.json");

        let list = AllowList::open(&path).await.expect("open");
        assert!(list.all().is_empty());
        assert_eq!(
            tokio::fs::read_to_string(&path).await.expect("read"),
            "[]"
        );
    }

    #[tokio::test]
    async fn test_add_then_contains() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        let list = AllowList::open(&path).await.expect("open");

        assert!(list.add("111").await.expect("add"));
        assert!(list.contains("111"));
        assert!(!list.contains("222"));
        assert_eq!(read_file(&path).await, vec!["111"]);
    }

    #[tokio::test]
    async fn test_add_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        let list = AllowList::open(&path).await.expect("open");

        assert!(list.add("111").await.expect("add"));
        assert!(!list.add("111").await.expect("add again"));
        assert_eq!(list.all(), vec!["111"]);
        assert_eq!(read_file(&path).await, vec!["111"]);
    }

    #[tokio::test]
    async fn test_remove_then_contains() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        let list = AllowList::open(&path).await.expect("open");

        list.add("111").await.expect("add");
        list.add("222").await.expect("add");
        assert!(list.remove("111").await.expect("remove"));
        assert!(!list.contains("111"));
        assert!(list.contains("222"));
        assert!(!list.remove("111").await.expect("remove again"));
        assert_eq!(read_file(&path).await, vec!["222"]);
    }

    #[tokio::test]
    async fn test_open_collapses_duplicates() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        tokio::fs::write(&path, r#"["111","222","111","333","222"]"#)
            .await
            .expect("seed");

        let list = AllowList::open(&path).await.expect("open");
        assert_eq!(list.all(), vec!["111", "222", "333"]);
        assert_eq!(read_file(&path).await, vec!["111", "222", "333"]);

        assert!(list.remove("222").await.expect("remove"));
        assert!(!list.contains("222"));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        {
            let list = AllowList::open(&path).await.expect("open");
            list.add("111").await.expect("add");
            list.add("222").await.expect("add");
        }
        let reopened = AllowList::open(&path).await.expect("reopen");
        assert_eq!(reopened.all(), vec!["111", "222"]);
    }

    #[tokio::test]
    async fn test_malformed_file_is_persistence_error() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        tokio::fs::write(&path, "{not json").await.expect("seed");

        let result = AllowList::open(&path).await;
        assert!(matches!(result, Err(AutomodError::Persistence(_))));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_list_unchanged() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("sub").join("whitelist.json");
        let list = AllowList::open(&path).await.expect("open");
        list.add("111").await.expect("add");

        // Removing the directory makes every subsequent write fail
        tokio::fs::remove_dir_all(dir.path().join("sub"))
            .await
            .expect("remove dir");

        let result = list.add("222").await;
        assert!(matches!(result, Err(AutomodError::Persistence(_))));
        assert!(!list.contains("222"));

        let result = list.remove("111").await;
        assert!(matches!(result, Err(AutomodError::Persistence(_))));
        assert!(list.contains("111"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        let list = AllowList::open(&path).await.expect("open");

        let mut tasks = Vec::new();
        for i in 0..20 {
            let list = list.clone();
            tasks.push(tokio::spawn(async move {
                list.add(&format!("{i}")).await.expect("add");
            }));
        }
        for task in tasks {
            task.await.expect("join");
        }

        assert_eq!(list.all().len(), 20);
        let mut persisted = read_file(&path).await;
        persisted.sort();
        let mut expected: Vec<String> = (0..20).map(|i| format!("{i}")).collect();
        expected.sort();
        assert_eq!(persisted, expected);
    }

    #[tokio::test]
    async fn test_failed_replace_removes_temp_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("whitelist.json");
        tokio::fs::create_dir(&path).await.expect("mkdir");
        tokio::fs::write(path.join("keep"), "x").await.expect("write");

        let err = write_atomically(&path, &["1".to_string()])
            .await
            .expect_err("rename onto a directory");
        assert_eq!(err.kind(), "persistence");
        assert!(!dir.path().join("whitelist.json.tmp").exists());
    }
}

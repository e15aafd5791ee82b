//! history.rs — bounded, time-ordered store of whole-page captures on disk.
//!
//! Each capture is one file named `<prefix>YYYY-MM-DDTHH-MM-SS[_NNN].<ext>`
//! (UTC, zero padded), so sorting names bytewise sorts captures by time. The
//! directory listing is the only index; every run re-derives it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::config::StoreConfig;
use crate::error::{WatchError, WatchResult};

const STAMP_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const STAMP_LEN: usize = 19;
// Same-second suffixes `_001`..`_999`; `_` sorts after `.` so a suffixed name
// lands after its base name and before the next second.
const MAX_COLLISIONS: u32 = 999;

/// One stored capture, read back from disk.
#[derive(Debug, Clone)]
pub struct Capture {
    pub name: String,
    pub document: String,
}

impl Capture {
    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        parse_stamp(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    cfg: StoreConfig,
}

impl SnapshotStore {
    pub fn new(cfg: StoreConfig) -> Self {
        Self { cfg }
    }

    pub fn dir(&self) -> &Path {
        &self.cfg.dir
    }

    /// File name for a capture taken at `at`; `seq > 0` adds the collision suffix.
    pub fn capture_name(&self, at: DateTime<Utc>, seq: u32) -> String {
        let stamp = at.format(STAMP_FORMAT);
        if seq == 0 {
            format!("{}{stamp}.{}", self.cfg.file_prefix, self.cfg.file_extension)
        } else {
            format!(
                "{}{stamp}_{seq:03}.{}",
                self.cfg.file_prefix, self.cfg.file_extension
            )
        }
    }

    /// True for names this store wrote; anything else in the directory is ignored.
    pub fn is_capture_name(&self, name: &str) -> bool {
        let Some(rest) = name.strip_prefix(self.cfg.file_prefix.as_str()) else {
            return false;
        };
        let Some(rest) = rest
            .strip_suffix(self.cfg.file_extension.as_str())
            .and_then(|r| r.strip_suffix('.'))
        else {
            return false;
        };
        if rest.len() < STAMP_LEN || !rest.is_char_boundary(STAMP_LEN) {
            return false;
        }
        let (stamp, suffix) = rest.split_at(STAMP_LEN);
        let suffix_ok = suffix.is_empty()
            || (suffix.len() == 4
                && suffix.starts_with('_')
                && suffix[1..].bytes().all(|b| b.is_ascii_digit()));
        suffix_ok && NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).is_ok()
    }

    /// Stored capture names, oldest first.
    pub async fn list(&self) -> WatchResult<Vec<String>> {
        let mut entries = match fs::read_dir(&self.cfg.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(WatchError::storage("listing snapshot directory", e)),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| WatchError::storage("listing snapshot directory", e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if self.is_capture_name(&name) {
                names.push(name);
            }
        }
        order_captures(&mut names);
        Ok(names)
    }

    pub async fn count(&self) -> WatchResult<usize> {
        Ok(self.list().await?.len())
    }

    /// The newest capture, if any. Older ones are never read back.
    pub async fn latest(&self) -> WatchResult<Option<Capture>> {
        let Some(name) = self.list().await?.pop() else {
            return Ok(None);
        };
        let path = self.cfg.dir.join(&name);
        let document = fs::read_to_string(&path)
            .await
            .map_err(|e| WatchError::storage(&format!("reading {}", path.display()), e))?;
        tracing::debug!(capture = %name, bytes = document.len(), "previous capture loaded");
        Ok(Some(Capture { name, document }))
    }

    /// Store `document` stamped with the current time, then prune.
    pub async fn persist(&self, document: &str) -> WatchResult<PathBuf> {
        self.persist_at(document, Utc::now()).await
    }

    /// Store `document` stamped with `at` (second granularity), wait for the
    /// file count to settle, then apply the retention cap.
    pub async fn persist_at(&self, document: &str, at: DateTime<Utc>) -> WatchResult<PathBuf> {
        fs::create_dir_all(&self.cfg.dir)
            .await
            .map_err(|e| WatchError::storage("creating snapshot directory", e))?;
        let before = self.count().await?;

        let (path, mut file) = self.create_unique(at).await?;
        file.write_all(document.as_bytes())
            .await
            .map_err(|e| WatchError::storage(&format!("writing {}", path.display()), e))?;
        file.sync_all()
            .await
            .map_err(|e| WatchError::storage(&format!("syncing {}", path.display()), e))?;
        drop(file);
        tracing::info!(capture = %path.display(), bytes = document.len(), "capture persisted");

        self.await_confirmation(before + 1).await;
        self.enforce_retention(self.cfg.max_retained).await?;
        Ok(path)
    }

    async fn create_unique(&self, at: DateTime<Utc>) -> WatchResult<(PathBuf, fs::File)> {
        for seq in 0..=MAX_COLLISIONS {
            let path = self.cfg.dir.join(self.capture_name(at, seq));
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(WatchError::storage(&format!("creating {}", path.display()), e))
                }
            }
        }
        Err(WatchError::Storage(format!(
            "more than {MAX_COLLISIONS} captures stamped {}",
            at.format(STAMP_FORMAT)
        )))
    }

    /// Poll until at least `expected` captures are visible. Gives up quietly
    /// after the confirm timeout; the write itself already happened.
    pub(crate) async fn await_confirmation(&self, expected: usize) -> bool {
        let timeout = self.cfg.confirm_timeout();
        let poll = self.cfg.confirm_poll();
        let started = tokio::time::Instant::now();
        loop {
            match self.count().await {
                Ok(n) if n >= expected => return true,
                Ok(_) => {}
                Err(e) => tracing::debug!(error = %e, "confirmation listing failed"),
            }
            if started.elapsed() >= timeout {
                tracing::warn!(
                    expected,
                    timeout_secs = timeout.as_secs(),
                    "capture count did not settle; continuing"
                );
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Delete oldest captures until at most `max_count` remain. Returns the
    /// removed names, oldest first.
    pub async fn enforce_retention(&self, max_count: usize) -> WatchResult<Vec<String>> {
        let names = self.list().await?;
        if names.len() <= max_count {
            return Ok(Vec::new());
        }
        let excess = names.len() - max_count;
        let mut removed = Vec::with_capacity(excess);
        for name in names.into_iter().take(excess) {
            let path = self.cfg.dir.join(&name);
            match fs::remove_file(&path).await {
                Ok(()) => {}
                // someone else pruned it first
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(WatchError::storage(&format!("removing {}", path.display()), e))
                }
            }
            removed.push(name);
        }
        tracing::info!(removed = removed.len(), kept = max_count, "retention applied");
        Ok(removed)
    }
}

/// Chronological order of capture names. Fixed-width stamps make this a
/// plain bytewise sort.
pub fn order_captures(names: &mut [String]) {
    names.sort_unstable();
}

fn parse_stamp(name: &str) -> Option<DateTime<Utc>> {
    (0..name.len())
        .filter_map(|i| name.get(i..i + STAMP_LEN))
        .find_map(|stamp| NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok())
        .map(|n| n.and_utc())
}

// ABOUTME: Per-site lock serializing mutating operations on one site.
// ABOUTME: Lock files are hard-linked into <data_dir>/locks fully written, released when dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::types::SiteId;

/// Who holds a site lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the holder.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub site: String,
}

/// How long an unreadable lock file is left alone before it is broken.
pub const UNREADABLE_GRACE: Duration = Duration::from_secs(30);

impl LockInfo {
    pub fn new(site: &SiteId) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            site: site.to_string(),
        }
    }

    /// Locks older than an hour belong to a crashed or wedged operation.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("site {site} is busy: locked by {holder} (pid {pid}) since {started_at}")]
    Held {
        site: String,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("lock file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("site {0} is busy: its lock file cannot be read yet")]
    Unreadable(String),

    #[error("lock for site {0} was taken by another process while breaking a stale lock")]
    Contended(String),
}

impl LockError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LockError::Held { .. } | LockError::Unreadable(_) | LockError::Contended(_) => {
                ErrorKind::Conflict
            }
            LockError::Io { .. } => ErrorKind::Runtime,
        }
    }
}

/// A held site lock; the file is removed on drop.
#[derive(Debug)]
pub struct SiteLock {
    path: PathBuf,
}

impl SiteLock {
    pub fn lock_path(dir: &Path, site: &SiteId) -> PathBuf {
        dir.join(format!("{site}.lock"))
    }

    /// Take the lock or fail fast. Stale locks are broken with a warning, and so are
    /// unreadable or corrupt ones once they are older than [`UNREADABLE_GRACE`].
    pub fn acquire(dir: &Path, site: &SiteId) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir).map_err(|source| LockError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = Self::lock_path(dir, site);
        let info = LockInfo::new(site);

        if Self::try_create(&path, &info)? {
            return Ok(Self { path });
        }

        match std::fs::read_to_string(&path)
            .ok()
            .and_then(|raw| serde_json::from_str::<LockInfo>(&raw).ok())
        {
            Some(existing) if !existing.is_stale() => {
                return Err(LockError::Held {
                    site: site.to_string(),
                    holder: existing.holder,
                    pid: existing.pid,
                    started_at: existing.started_at,
                });
            }
            Some(existing) => tracing::warn!(
                %site,
                holder = %existing.holder,
                pid = existing.pid,
                since = %existing.started_at,
                "breaking stale site lock"
            ),
            None if Self::younger_than(&path, UNREADABLE_GRACE) => {
                return Err(LockError::Unreadable(site.to_string()));
            }
            None => tracing::warn!(%site, "site lock unreadable or corrupt, breaking it"),
        }

        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == IoErrorKind::NotFound => {}
            Err(source) => return Err(LockError::Io { path, source }),
        }

        if Self::try_create(&path, &info)? {
            Ok(Self { path })
        } else {
            Err(LockError::Contended(site.to_string()))
        }
    }

    /// Returns false if the file already exists. The lock appears with its
    /// contents in place: it is written under a private name and linked in.
    fn try_create(path: &Path, info: &LockInfo) -> Result<bool, LockError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = path.with_file_name(format!(".{file_name}.{}.tmp", Uuid::new_v4().simple()));
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: std::io::Error| LockError::Io { path, source }
        };

        let written = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staging)
            .and_then(|mut file| {
                let body = serde_json::to_vec(info)?;
                file.write_all(&body)?;
                file.sync_all()
            })
            .map_err(io_err(&staging))
            .and_then(|()| match std::fs::hard_link(&staging, path) {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == IoErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(io_err(path)(e)),
            });

        if let Err(e) = std::fs::remove_file(&staging)
            && e.kind() != IoErrorKind::NotFound
        {
            tracing::debug!(path = %staging.display(), error = %e, "failed to remove lock staging file");
        }
        written
    }

    /// True when the file at `path` was modified less than `age` ago.
    fn younger_than(path: &Path, age: Duration) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_none_or(|elapsed| elapsed < age)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SiteLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != IoErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release site lock");
        }
    }
}

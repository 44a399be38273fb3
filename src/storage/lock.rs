//! Cross-process lock files for the file backend

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};

/// Lock files older than this belong to a writer that died mid-commit
const STALE_AFTER: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Exclusive lock held through a `create_new` lock file. Released on drop.
#[derive(Debug)]
pub struct FileLockGuard {
    lock_file: PathBuf,
    token: String,
}

impl FileLockGuard {
    /// Wait up to `timeout` for `lock_file` to be free, then take it
    pub async fn acquire(lock_file: PathBuf, timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = lock_file.parent() {
            fs::create_dir_all(parent).await?;
        }
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&lock_file)
                .await
            {
                Ok(mut file) => {
                    let token = Uuid::new_v4().to_string();
                    file.write_all(token.as_bytes()).await?;
                    return Ok(Self { lock_file, token });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&lock_file).await {
                        warn!(lock = %lock_file.display(), "removing stale lock file");
                        match fs::remove_file(&lock_file).await {
                            Ok(()) => continue,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(StorageError::Io(e)),
                        }
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(StorageError::Timeout(timeout));
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_file
    }
}

async fn is_stale(lock_file: &Path) -> bool {
    let Ok(metadata) = fs::metadata(lock_file).await else {
        return false;
    };
    metadata
        .modified()
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age > STALE_AFTER)
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // Only remove the file if it still carries our token
        let ours = std::fs::read_to_string(&self.lock_file)
            .map(|content| content == self.token)
            .unwrap_or(false);
        if ours {
            if let Err(e) = std::fs::remove_file(&self.lock_file) {
                debug!(lock = %self.lock_file.display(), error = %e, "lock file already gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_second_holder_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("locks").join("users").join("ada.lock");

        let first = FileLockGuard::acquire(path.clone(), Duration::from_secs(1))
            .await
            .unwrap();
        let err = FileLockGuard::acquire(path.clone(), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Timeout(_)));

        drop(first);
        assert!(!path.exists());
        let second = FileLockGuard::acquire(path.clone(), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(second.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_stale_lock_is_taken_over() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("crashed.lock");
        std::fs::write(&path, "dead-writer").unwrap();
        let old = SystemTime::now() - Duration::from_secs(120);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let guard = FileLockGuard::acquire(path.clone(), Duration::from_millis(50))
            .await
            .unwrap();
        assert_ne!(std::fs::read_to_string(&path).unwrap(), "dead-writer");
        drop(guard);
        assert!(!path.exists());
    }
}

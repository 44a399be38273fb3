//! File-based storage backend implementation
//!
//! Layout under the base directory:
//!
//! ```text
//! users/<uid>/profile.json              user record
//! users/<uid>/achievements/<id>.json    achievement sub-records
//! catalog/<course>.json                 module documents of a course
//! locks/users/<uid>.lock                held while a user's documents change
//! locks/catalog/<course>.lock           held while a course is replaced
//! ```
//!
//! Identifiers are percent-encoded into file names, so distinct ids never
//! share a file and achievement ids decode back from their file stems.
//!
//! Every document file carries its version. Writes go through a temporary
//! file and a rename so readers never observe a torn document. The version
//! check and rename happen under a lock file, which keeps conditional
//! writes atomic across processes sharing one directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::achievements::AchievementId;
use crate::course::CourseId;
use crate::storage::{
    config::StorageConfig,
    error::{StorageError, StorageResult},
    lock::FileLockGuard,
    traits::DocumentStore,
    types::*,
};

/// How long a writer waits for another process to release a lock file
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// On-disk envelope of a versioned document
#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument<T> {
    version: u64,
    updated_at: DateTime<Utc>,
    data: T,
}

/// File-based storage backend
pub struct FileBackend {
    base_dir: PathBuf,
    /// Serializes writers of this process; lock files cover other processes
    write_gate: Mutex<()>,
    feeds: Arc<RwLock<HashMap<UserId, watch::Sender<Versioned<UserDocument>>>>>,
}

impl FileBackend {
    /// Create a new file backend
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        Self::with_base_dir(config.resolved_base_dir()).await
    }

    /// Create a file backend rooted at `base_dir`
    pub async fn with_base_dir(base_dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_dir = base_dir.into();

        // Ensure base directory exists
        fs::create_dir_all(&base_dir).await.map_err(|e| {
            StorageError::unavailable(format!(
                "cannot create storage directory {}: {}",
                base_dir.display(),
                e
            ))
        })?;

        Ok(Self {
            base_dir,
            write_gate: Mutex::new(()),
            feeds: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn user_dir(&self, uid: &UserId) -> PathBuf {
        self.base_dir.join("users").join(file_key(uid.as_str()))
    }

    fn profile_path(&self, uid: &UserId) -> PathBuf {
        self.user_dir(uid).join("profile.json")
    }

    fn achievements_dir(&self, uid: &UserId) -> PathBuf {
        self.user_dir(uid).join("achievements")
    }

    fn achievement_path(&self, uid: &UserId, id: &AchievementId) -> PathBuf {
        self.achievements_dir(uid)
            .join(format!("{}.json", file_key(id.as_str())))
    }

    fn catalog_path(&self, course: &CourseId) -> PathBuf {
        self.base_dir
            .join("catalog")
            .join(format!("{}.json", file_key(course.as_str())))
    }

    fn lock_path(&self, kind: &str, key: &str) -> PathBuf {
        self.base_dir
            .join("locks")
            .join(kind)
            .join(format!("{}.lock", file_key(key)))
    }

    async fn lock_user(&self, uid: &UserId) -> StorageResult<FileLockGuard> {
        FileLockGuard::acquire(self.lock_path("users", uid.as_str()), LOCK_TIMEOUT).await
    }

    /// Read a versioned JSON document, `absent` when the file does not exist
    async fn read_doc<T: DeserializeOwned>(&self, path: &Path) -> StorageResult<Versioned<T>> {
        match fs::read_to_string(path).await {
            Ok(content) => {
                let stored: StoredDocument<T> = serde_json::from_str(&content)?;
                Ok(Versioned {
                    version: Version(stored.version),
                    value: Some(stored.data),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Versioned::absent()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    /// Write JSON atomically via a sibling temp file
    async fn write_json<T: Serialize>(&self, path: &Path, data: &T) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Conditional write of a versioned document; caller holds the lock of
    /// the owning user
    async fn write_versioned<T>(
        &self,
        path: &Path,
        expected: Version,
        doc: T,
    ) -> StorageResult<Version>
    where
        T: Serialize + DeserializeOwned,
    {
        let current: Versioned<T> = self.read_doc(path).await?;
        if current.version != expected {
            return Err(StorageError::conflict(format!(
                "{} is at version {}, expected {}",
                path.display(),
                current.version.0,
                expected.0
            )));
        }

        let version = expected.next();
        let stored = StoredDocument {
            version: version.0,
            updated_at: Utc::now(),
            data: doc,
        };
        self.write_json(path, &stored).await?;
        Ok(version)
    }

    /// Push the committed user record to subscribers. The write already
    /// happened, so a failed re-read is logged rather than returned.
    async fn publish(&self, uid: &UserId) {
        let feed = self.feeds.read().await.get(uid).cloned();
        let Some(feed) = feed else {
            return;
        };
        if feed.is_closed() {
            self.feeds.write().await.remove(uid);
            return;
        }
        match self.read_doc(&self.profile_path(uid)).await {
            Ok(snapshot) => {
                feed.send_replace(snapshot);
            }
            Err(e) => warn!(%uid, error = %e, "committed write not published to subscribers"),
        }
    }
}

/// Percent-encode an identifier into a file name. Dots are encoded too so
/// no key can name `.` or `..`.
fn file_key(raw: &str) -> String {
    urlencoding::encode(raw).replace('.', "%2E")
}

/// Inverse of [`file_key`]
fn decode_file_key(key: &str) -> Option<String> {
    urlencoding::decode(key).ok().map(|decoded| decoded.into_owned())
}

#[async_trait]
impl DocumentStore for FileBackend {
    async fn read_user(&self, uid: &UserId) -> StorageResult<Versioned<UserDocument>> {
        self.read_doc(&self.profile_path(uid)).await
    }

    async fn write_user(
        &self,
        uid: &UserId,
        expected: Version,
        doc: UserDocument,
    ) -> StorageResult<Version> {
        let version = {
            let _gate = self.write_gate.lock().await;
            let _lock = self.lock_user(uid).await?;
            self.write_versioned(&self.profile_path(uid), expected, doc)
                .await?
        };
        self.publish(uid).await;
        Ok(version)
    }

    async fn read_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
    ) -> StorageResult<Versioned<AchievementDocument>> {
        self.read_doc(&self.achievement_path(uid, id)).await
    }

    async fn write_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
        expected: Version,
        doc: AchievementDocument,
    ) -> StorageResult<Version> {
        let _gate = self.write_gate.lock().await;
        let _lock = self.lock_user(uid).await?;
        self.write_versioned(&self.achievement_path(uid, id), expected, doc)
            .await
    }

    async fn list_achievements(
        &self,
        uid: &UserId,
    ) -> StorageResult<BTreeMap<AchievementId, AchievementDocument>> {
        let dir = self.achievements_dir(uid);
        let mut result = BTreeMap::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(result),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_file_key)
            else {
                continue;
            };
            let doc: Versioned<AchievementDocument> = self.read_doc(&path).await?;
            if let Some(doc) = doc.value {
                result.insert(AchievementId::new(id), doc);
            }
        }

        Ok(result)
    }

    async fn apply_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut touched = Vec::new();
        {
            let _gate = self.write_gate.lock().await;

            // Ordered acquisition keeps two batches from deadlocking
            let owners: BTreeSet<UserId> = batch
                .ops
                .iter()
                .map(|op| match op {
                    WriteOp::MergeUser { uid, .. } | WriteOp::CreateAchievement { uid, .. } => {
                        uid.clone()
                    }
                })
                .collect();
            let mut held = Vec::with_capacity(owners.len());
            for uid in &owners {
                held.push(self.lock_user(uid).await?);
            }

            // Stage every document first so a failure leaves nothing half-applied
            let mut staged: Vec<(PathBuf, String)> = Vec::new();
            let mut users: HashMap<UserId, Versioned<UserDocument>> = HashMap::new();

            for op in batch.ops {
                match op {
                    WriteOp::MergeUser { uid, patch } => {
                        if !users.contains_key(&uid) {
                            let current = self.read_doc(&self.profile_path(&uid)).await?;
                            users.insert(uid.clone(), current);
                        }
                        if let Some(entry) = users.get_mut(&uid) {
                            entry
                                .value
                                .get_or_insert_with(UserDocument::default)
                                .merge(patch);
                        }
                    }
                    WriteOp::CreateAchievement { uid, id, doc } => {
                        let path = self.achievement_path(&uid, &id);
                        let existing: Versioned<AchievementDocument> =
                            self.read_doc(&path).await?;
                        if !existing.exists() {
                            let stored = StoredDocument {
                                version: 1,
                                updated_at: Utc::now(),
                                data: doc,
                            };
                            staged.push((path, serde_json::to_string_pretty(&stored)?));
                        }
                    }
                }
            }

            for (uid, current) in users {
                let stored = StoredDocument {
                    version: current.version.next().0,
                    updated_at: Utc::now(),
                    data: current.value.unwrap_or_default(),
                };
                staged.push((
                    self.profile_path(&uid),
                    serde_json::to_string_pretty(&stored)?,
                ));
                touched.push(uid);
            }

            let mut renames = Vec::with_capacity(staged.len());
            for (path, content) in staged {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }
                let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
                fs::write(&tmp, content).await?;
                renames.push((tmp, path));
            }
            for (tmp, path) in renames {
                fs::rename(&tmp, &path).await?;
            }
        }

        for uid in touched {
            self.publish(&uid).await;
        }
        debug!(base_dir = %self.base_dir.display(), "applied write batch");
        Ok(())
    }

    async fn subscribe_user(&self, uid: &UserId) -> StorageResult<UserSubscription> {
        let snapshot = self.read_user(uid).await?;
        let mut feeds = self.feeds.write().await;

        let existing = feeds
            .get(uid)
            .filter(|feed| !feed.is_closed())
            .map(|feed| feed.subscribe());

        let receiver = match existing {
            Some(receiver) => receiver,
            None => {
                let (tx, rx) = watch::channel(snapshot);
                feeds.insert(uid.clone(), tx);
                rx
            }
        };

        Ok(UserSubscription {
            id: Uuid::new_v4().to_string(),
            uid: uid.clone(),
            receiver,
        })
    }

    async fn load_modules(&self, course: &CourseId) -> StorageResult<Vec<ModuleDocument>> {
        match fs::read_to_string(self.catalog_path(course)).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn put_modules(
        &self,
        course: &CourseId,
        modules: Vec<ModuleDocument>,
    ) -> StorageResult<()> {
        let _gate = self.write_gate.lock().await;
        let _lock =
            FileLockGuard::acquire(self.lock_path("catalog", course.as_str()), LOCK_TIMEOUT)
                .await?;
        self.write_json(&self.catalog_path(course), &modules).await
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let users_dir = self.base_dir.join("users");
        let mut users = 0;
        if let Ok(mut entries) = fs::read_dir(&users_dir).await {
            while let Some(entry) = entries.next_entry().await? {
                if entry.path().is_dir() {
                    users += 1;
                }
            }
        }

        Ok(HealthStatus {
            healthy: self.base_dir.exists(),
            backend_type: "file".to_string(),
            users,
            message: Some(self.base_dir.display().to_string()),
        })
    }
}

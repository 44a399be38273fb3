//! In-memory storage backend for testing

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::achievements::AchievementId;
use crate::course::CourseId;
use crate::storage::{
    error::{StorageError, StorageResult},
    traits::DocumentStore,
    types::*,
};

#[derive(Default)]
struct UserSlot {
    user: Option<UserDocument>,
    version: Version,
    achievements: BTreeMap<AchievementId, (Version, AchievementDocument)>,
}

#[derive(Default)]
struct State {
    users: HashMap<UserId, UserSlot>,
    catalog: HashMap<CourseId, Vec<ModuleDocument>>,
    feeds: HashMap<UserId, watch::Sender<Versioned<UserDocument>>>,
}

impl State {
    fn publish(&mut self, uid: &UserId) {
        let Some(feed) = self.feeds.get(uid) else {
            return;
        };
        if feed.is_closed() {
            self.feeds.remove(uid);
            return;
        }
        let snapshot = match self.users.get(uid) {
            Some(slot) => Versioned {
                version: slot.version,
                value: slot.user.clone(),
            },
            None => Versioned::absent(),
        };
        feed.send_replace(snapshot);
    }
}

/// In-memory storage backend for testing
///
/// Every operation runs under one `RwLock`, which makes the version check and
/// the write of a conditional update atomic.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
}

impl MemoryBackend {
    /// Create a new, empty memory backend
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryBackend {
    async fn read_user(&self, uid: &UserId) -> StorageResult<Versioned<UserDocument>> {
        let state = self.state.read().await;
        Ok(match state.users.get(uid) {
            Some(slot) => Versioned {
                version: slot.version,
                value: slot.user.clone(),
            },
            None => Versioned::absent(),
        })
    }

    async fn write_user(
        &self,
        uid: &UserId,
        expected: Version,
        doc: UserDocument,
    ) -> StorageResult<Version> {
        let mut state = self.state.write().await;
        let slot = state.users.entry(uid.clone()).or_default();

        if slot.version != expected {
            return Err(StorageError::conflict(format!(
                "users/{} is at version {}, expected {}",
                uid, slot.version.0, expected.0
            )));
        }

        slot.version = slot.version.next();
        slot.user = Some(doc);
        let version = slot.version;

        state.publish(uid);
        Ok(version)
    }

    async fn read_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
    ) -> StorageResult<Versioned<AchievementDocument>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(uid)
            .and_then(|slot| slot.achievements.get(id))
            .map(|(version, doc)| Versioned {
                version: *version,
                value: Some(doc.clone()),
            })
            .unwrap_or_else(Versioned::absent))
    }

    async fn write_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
        expected: Version,
        doc: AchievementDocument,
    ) -> StorageResult<Version> {
        let mut state = self.state.write().await;
        let slot = state.users.entry(uid.clone()).or_default();
        let current = slot
            .achievements
            .get(id)
            .map(|(version, _)| *version)
            .unwrap_or(Version::ABSENT);

        if current != expected {
            return Err(StorageError::conflict(format!(
                "users/{}/achievements/{} is at version {}, expected {}",
                uid, id, current.0, expected.0
            )));
        }

        let version = current.next();
        slot.achievements.insert(id.clone(), (version, doc));
        Ok(version)
    }

    async fn list_achievements(
        &self,
        uid: &UserId,
    ) -> StorageResult<BTreeMap<AchievementId, AchievementDocument>> {
        let state = self.state.read().await;
        Ok(state
            .users
            .get(uid)
            .map(|slot| {
                slot.achievements
                    .iter()
                    .map(|(id, (_, doc))| (id.clone(), doc.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn apply_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let mut touched = Vec::new();

        for op in batch.ops {
            match op {
                WriteOp::MergeUser { uid, patch } => {
                    let slot = state.users.entry(uid.clone()).or_default();
                    slot.user.get_or_insert_with(UserDocument::default).merge(patch);
                    slot.version = slot.version.next();
                    touched.push(uid);
                }
                WriteOp::CreateAchievement { uid, id, doc } => {
                    let slot = state.users.entry(uid).or_default();
                    slot.achievements
                        .entry(id)
                        .or_insert((Version::ABSENT.next(), doc));
                }
            }
        }

        for uid in touched {
            state.publish(&uid);
        }
        Ok(())
    }

    async fn subscribe_user(&self, uid: &UserId) -> StorageResult<UserSubscription> {
        let mut state = self.state.write().await;
        let snapshot = match state.users.get(uid) {
            Some(slot) => Versioned {
                version: slot.version,
                value: slot.user.clone(),
            },
            None => Versioned::absent(),
        };

        let existing = state
            .feeds
            .get(uid)
            .filter(|feed| !feed.is_closed())
            .map(|feed| feed.subscribe());

        let receiver = match existing {
            Some(receiver) => receiver,
            None => {
                let (tx, rx) = watch::channel(snapshot);
                state.feeds.insert(uid.clone(), tx);
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
        let state = self.state.read().await;
        Ok(state.catalog.get(course).cloned().unwrap_or_default())
    }

    async fn put_modules(
        &self,
        course: &CourseId,
        modules: Vec<ModuleDocument>,
    ) -> StorageResult<()> {
        self.state
            .write()
            .await
            .catalog
            .insert(course.clone(), modules);
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        Ok(HealthStatus {
            healthy: true,
            backend_type: "memory".to_string(),
            users: state.users.len(),
            message: None,
        })
    }
}

//! Type definitions for the storage abstraction layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::achievements::AchievementId;
use crate::course::{CourseId, ModuleId};
use crate::progress::Position;

/// User identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Monotonic document version used for conditional writes.
///
/// Version 0 means the document does not exist yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version(pub u64);

impl Version {
    pub const ABSENT: Version = Version(0);

    pub fn next(self) -> Version {
        Version(self.0 + 1)
    }
}

/// A document together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: Version,
    pub value: Option<T>,
}

impl<T> Versioned<T> {
    pub fn absent() -> Self {
        Self {
            version: Version::ABSENT,
            value: None,
        }
    }

    pub fn exists(&self) -> bool {
        self.value.is_some()
    }
}

impl<T: Default> Versioned<T> {
    /// The stored value, or a default document when nothing is stored yet
    pub fn value_or_default(self) -> T {
        self.value.unwrap_or_default()
    }
}

/// Persisted user record.
///
/// Resource fields are optional so that a missing field can be told apart
/// from a stored zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lives: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coins: Option<u32>,
    #[serde(default, rename = "lastLifeTS")]
    pub last_life_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_modules: BTreeSet<ModuleId>,
    #[serde(default)]
    pub progress: BTreeMap<CourseId, Position>,
}

impl UserDocument {
    pub fn lives(&self) -> u32 {
        self.lives.unwrap_or(0)
    }

    pub fn hints(&self) -> u32 {
        self.hints.unwrap_or(0)
    }

    pub fn coins(&self) -> u32 {
        self.coins.unwrap_or(0)
    }

    /// Merge `patch` into this document: present fields win, sets and maps
    /// are unioned. Completed modules never shrink.
    pub fn merge(&mut self, patch: UserDocument) {
        if patch.nickname.is_some() {
            self.nickname = patch.nickname;
        }
        if patch.avatar_name.is_some() {
            self.avatar_name = patch.avatar_name;
        }
        if patch.created_at.is_some() {
            self.created_at = patch.created_at;
        }
        if patch.lives.is_some() {
            self.lives = patch.lives;
        }
        if patch.hints.is_some() {
            self.hints = patch.hints;
        }
        if patch.coins.is_some() {
            self.coins = patch.coins;
        }
        if patch.last_life_ts.is_some() {
            self.last_life_ts = patch.last_life_ts;
        }
        self.completed_modules.extend(patch.completed_modules);
        self.progress.extend(patch.progress);
    }
}

/// Persisted achievement sub-record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDocument {
    #[serde(default)]
    pub unlocked: bool,
    #[serde(default)]
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl AchievementDocument {
    pub fn locked() -> Self {
        Self::default()
    }

    pub fn unlocked_at(at: DateTime<Utc>) -> Self {
        Self {
            unlocked: true,
            unlocked_at: Some(at),
        }
    }
}

/// Catalog module as stored; decoded leniently by [`crate::course`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub pages: Vec<PageDocument>,
}

/// Catalog page as stored, discriminated by `type`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageDocument {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// One operation of an atomic multi-document write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Merge fields into the user record, creating it when absent
    MergeUser { uid: UserId, patch: UserDocument },
    /// Create an achievement record unless one already exists
    CreateAchievement {
        uid: UserId,
        id: AchievementId,
        doc: AchievementDocument,
    },
}

/// Batched multi-document write, applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge_user(mut self, uid: &UserId, patch: UserDocument) -> Self {
        self.ops.push(WriteOp::MergeUser {
            uid: uid.clone(),
            patch,
        });
        self
    }

    pub fn create_achievement(
        mut self,
        uid: &UserId,
        id: AchievementId,
        doc: AchievementDocument,
    ) -> Self {
        self.ops.push(WriteOp::CreateAchievement {
            uid: uid.clone(),
            id,
            doc,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Live feed of one user record.
///
/// Every committed write publishes a new immutable snapshot. Dropping the
/// subscription cancels it.
pub struct UserSubscription {
    pub id: String,
    pub uid: UserId,
    pub receiver: watch::Receiver<Versioned<UserDocument>>,
}

impl UserSubscription {
    /// The latest snapshot without waiting
    pub fn current(&self) -> Versioned<UserDocument> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next committed change. Returns `None` once the store
    /// has shut the feed down.
    pub async fn changed(&mut self) -> Option<Versioned<UserDocument>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    /// Turn the subscription into a stream that yields the current snapshot
    /// first and then every change
    pub fn into_stream(self) -> WatchStream<Versioned<UserDocument>> {
        WatchStream::new(self.receiver)
    }
}

/// Storage health status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub backend_type: String,
    pub users: usize,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_existing_fields_and_unions_sets() {
        let mut doc = UserDocument {
            lives: Some(4),
            coins: Some(12),
            completed_modules: [ModuleId::from("m1")].into_iter().collect(),
            ..Default::default()
        };

        doc.merge(UserDocument {
            lives: Some(5),
            completed_modules: [ModuleId::from("m2")].into_iter().collect(),
            ..Default::default()
        });

        assert_eq!(doc.lives, Some(5));
        assert_eq!(doc.coins, Some(12));
        assert_eq!(doc.completed_modules.len(), 2);
    }

    #[test]
    fn test_user_document_wire_names() {
        let json = serde_json::json!({
            "lives": 3,
            "lastLifeTS": "2024-05-01T10:00:00Z",
            "completedModules": ["m1"],
            "progress": { "python": { "moduleIndex": 2, "pageIndex": 1 } }
        });

        let doc: UserDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.lives(), 3);
        assert_eq!(doc.hints(), 0);
        assert!(doc.last_life_ts.is_some());
        assert_eq!(
            doc.progress.get(&CourseId::from("python")),
            Some(&Position::new(2, 1))
        );
    }

    #[test]
    fn test_absent_versioned_defaults() {
        let versioned: Versioned<UserDocument> = Versioned::absent();
        assert!(!versioned.exists());
        assert_eq!(versioned.version, Version::ABSENT);
        assert_eq!(versioned.value_or_default(), UserDocument::default());
    }
}

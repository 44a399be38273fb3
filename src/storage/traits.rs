//! Core trait definitions for the storage abstraction layer

use async_trait::async_trait;
use std::collections::BTreeMap;

use super::error::StorageResult;
use super::types::*;
use crate::achievements::AchievementId;
use crate::course::CourseId;

/// Document store holding user records, their achievement sub-records and
/// the course catalog.
///
/// Writes to a single document are conditional on the version the caller
/// read; a mismatch fails with [`super::StorageError::Conflict`] and nothing
/// is written. Higher layers build read-modify-write transactions on top of
/// this (see [`super::transaction`]).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a user record with its current version
    async fn read_user(&self, uid: &UserId) -> StorageResult<Versioned<UserDocument>>;

    /// Replace a user record if it is still at `expected`.
    /// Returns the new version.
    async fn write_user(
        &self,
        uid: &UserId,
        expected: Version,
        doc: UserDocument,
    ) -> StorageResult<Version>;

    /// Read one achievement sub-record
    async fn read_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
    ) -> StorageResult<Versioned<AchievementDocument>>;

    /// Replace an achievement sub-record if it is still at `expected`
    async fn write_achievement(
        &self,
        uid: &UserId,
        id: &AchievementId,
        expected: Version,
        doc: AchievementDocument,
    ) -> StorageResult<Version>;

    /// All achievement sub-records of a user
    async fn list_achievements(
        &self,
        uid: &UserId,
    ) -> StorageResult<BTreeMap<AchievementId, AchievementDocument>>;

    /// Apply a batch of writes atomically
    async fn apply_batch(&self, batch: WriteBatch) -> StorageResult<()>;

    /// Subscribe to committed changes of a user record
    async fn subscribe_user(&self, uid: &UserId) -> StorageResult<UserSubscription>;

    /// Read every module document of a course
    async fn load_modules(&self, course: &CourseId) -> StorageResult<Vec<ModuleDocument>>;

    /// Replace the module documents of a course
    async fn put_modules(&self, course: &CourseId, modules: Vec<ModuleDocument>)
        -> StorageResult<()>;

    /// Check the health of the storage backend
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}

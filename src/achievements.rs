//! Course completion detection and idempotent achievement unlocks

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::course::{CourseCatalog, CourseId};
use crate::storage::transaction::AchievementTarget;
use crate::storage::{
    run_transaction, AchievementDocument, DocumentStore, RetryPolicy, StorageResult, TxDecision,
    UserId,
};

pub const WELCOME: &str = "WELCOME";
pub const FIRST_STEPS_IN_PY: &str = "FIRST_STEPS_IN_PY";
pub const FIRST_STEPS_IN_JS: &str = "FIRST_STEPS_IN_JS";
pub const PY_MASTER: &str = "PY_MASTER";
pub const JS_SAMURAI: &str = "JS_SAMURAI";

/// Achievement identifier, e.g. `JS_SAMURAI`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AchievementId(pub String);

impl AchievementId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AchievementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides when a course is finished and unlocks its achievement once
pub struct AchievementEngine {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn CourseCatalog>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    courses: BTreeMap<CourseId, AchievementId>,
}

impl AchievementEngine {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn CourseCatalog>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        courses: BTreeMap<CourseId, AchievementId>,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            retry,
            courses,
        }
    }

    /// Achievement awarded for finishing `course`, if any
    pub fn achievement_for(&self, course: &CourseId) -> Option<&AchievementId> {
        self.courses.get(course)
    }

    /// Unlock `id` unless it is already unlocked.
    ///
    /// Returns true only for the call that performed the unlock; the first
    /// unlock time is never overwritten.
    pub async fn unlock_achievement(&self, uid: &UserId, id: &AchievementId) -> StorageResult<bool> {
        let target = AchievementTarget::new(self.store.as_ref(), uid, id);
        let clock = Arc::clone(&self.clock);

        let unlocked = run_transaction(&target, &self.retry, |doc| match doc {
            Some(doc) if doc.unlocked => TxDecision::Abort(false),
            _ => TxDecision::Commit(AchievementDocument::unlocked_at(clock.now()), true),
        })
        .await?;

        if unlocked {
            info!(%uid, achievement = %id, "achievement unlocked");
        } else {
            debug!(%uid, achievement = %id, "achievement already unlocked");
        }
        Ok(unlocked)
    }

    /// Whether every module of `course` is completed. When it is, the
    /// course's achievement is unlocked (at most once).
    pub async fn check_course_completed(&self, uid: &UserId, course: &CourseId) -> StorageResult<bool> {
        let modules = self.catalog.load_course(course).await?;
        let total = modules.len();
        if total == 0 {
            return Ok(false);
        }

        let user = self.store.read_user(uid).await?.value_or_default();
        let completed = modules
            .iter()
            .filter(|module| user.completed_modules.contains(&module.id))
            .count();

        debug!(%uid, %course, completed, total, "checked course completion");
        if completed < total {
            return Ok(false);
        }

        match self.courses.get(course) {
            Some(id) => {
                self.unlock_achievement(uid, id).await?;
            }
            None => debug!(%course, "course has no completion achievement"),
        }
        Ok(true)
    }

    pub async fn list_achievements(
        &self,
        uid: &UserId,
    ) -> StorageResult<BTreeMap<AchievementId, AchievementDocument>> {
        self.store.list_achievements(uid).await
    }
}

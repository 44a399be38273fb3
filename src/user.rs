//! Immutable learner snapshots handed to callers

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::achievements::AchievementId;
use crate::course::{CourseId, ModuleId};
use crate::progress::Position;
use crate::storage::{AchievementDocument, UserDocument, Version};

/// Unlock state of one achievement
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AchievementState {
    pub unlocked: bool,
    pub unlocked_at: Option<DateTime<Utc>>,
}

impl From<AchievementDocument> for AchievementState {
    fn from(doc: AchievementDocument) -> Self {
        Self {
            unlocked: doc.unlocked,
            unlocked_at: doc.unlocked_at,
        }
    }
}

/// Point-in-time view of a learner's resources, progress and achievements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserState {
    pub version: Version,
    pub nickname: Option<String>,
    pub lives: u32,
    pub hints: u32,
    pub coins: u32,
    pub last_life_restore: Option<DateTime<Utc>>,
    pub completed_modules: BTreeSet<ModuleId>,
    pub progress: BTreeMap<CourseId, Position>,
    pub achievements: BTreeMap<AchievementId, AchievementState>,
}

impl UserState {
    /// Build a snapshot from stored documents; absent fields read as zero
    pub fn from_documents(
        version: Version,
        doc: UserDocument,
        achievements: BTreeMap<AchievementId, AchievementDocument>,
    ) -> Self {
        Self {
            version,
            lives: doc.lives(),
            hints: doc.hints(),
            coins: doc.coins(),
            nickname: doc.nickname,
            last_life_restore: doc.last_life_ts,
            completed_modules: doc.completed_modules,
            progress: doc.progress,
            achievements: achievements
                .into_iter()
                .map(|(id, doc)| (id, doc.into()))
                .collect(),
        }
    }

    pub fn is_unlocked(&self, id: &AchievementId) -> bool {
        self.achievements
            .get(id)
            .map(|state| state.unlocked)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_resources_read_as_zero() {
        let state = UserState::from_documents(
            Version::ABSENT,
            UserDocument::default(),
            BTreeMap::new(),
        );
        assert_eq!((state.lives, state.hints, state.coins), (0, 0, 0));
        assert!(state.last_life_restore.is_none());
        assert!(!state.is_unlocked(&AchievementId::new("WELCOME")));
    }
}

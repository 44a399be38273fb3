//! First-time setup of learner records

use std::sync::Arc;
use tracing::{debug, info};

use crate::achievements::{AchievementId, FIRST_STEPS_IN_JS, FIRST_STEPS_IN_PY, WELCOME};
use crate::clock::Clock;
use crate::config::EconomyConfig;
use crate::storage::{
    run_user_transaction, AchievementDocument, DocumentStore, RetryPolicy, StorageResult,
    TxDecision, UserDocument, UserId, WriteBatch,
};

pub struct UserBootstrapper {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    economy: EconomyConfig,
}

impl UserBootstrapper {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        economy: EconomyConfig,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            economy,
        }
    }

    /// Create the profile with starting resources and the base
    /// achievements in one atomic batch.
    ///
    /// `WELCOME` starts unlocked; the first-steps achievements start locked.
    /// Achievements that already exist are left as they are, so running this
    /// twice never relocks anything.
    pub async fn create_user_skeleton(
        &self,
        uid: &UserId,
        nickname: &str,
        avatar_name: &str,
    ) -> StorageResult<()> {
        let now = self.clock.now();
        let profile = UserDocument {
            nickname: Some(nickname.to_string()),
            avatar_name: Some(avatar_name.to_string()),
            created_at: Some(now),
            lives: Some(self.economy.start_lives),
            hints: Some(self.economy.start_hints),
            coins: Some(self.economy.start_coins),
            ..Default::default()
        };

        let batch = WriteBatch::new()
            .merge_user(uid, profile)
            .create_achievement(
                uid,
                AchievementId::new(WELCOME),
                AchievementDocument::unlocked_at(now),
            )
            .create_achievement(
                uid,
                AchievementId::new(FIRST_STEPS_IN_PY),
                AchievementDocument::locked(),
            )
            .create_achievement(
                uid,
                AchievementId::new(FIRST_STEPS_IN_JS),
                AchievementDocument::locked(),
            );

        self.store.apply_batch(batch).await?;
        info!(%uid, nickname, "created user skeleton");
        Ok(())
    }

    /// Fill in starting values for resource fields the record lacks.
    /// Existing values are never overwritten. Returns whether anything was
    /// written.
    pub async fn ensure_stats(&self, uid: &UserId) -> StorageResult<bool> {
        let economy = self.economy.clone();
        let filled = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            let missing = doc.lives.is_none() || doc.hints.is_none() || doc.coins.is_none();
            if !missing {
                return TxDecision::Abort(false);
            }
            doc.lives.get_or_insert(economy.start_lives);
            doc.hints.get_or_insert(economy.start_hints);
            doc.coins.get_or_insert(economy.start_coins);
            TxDecision::Commit(doc, true)
        })
        .await?;

        if filled {
            debug!(%uid, "filled missing resource fields");
        }
        Ok(filled)
    }
}

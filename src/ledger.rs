//! Resource ledger: lives, hints and coins of a learner
//!
//! Every mutation is an optimistic read-modify-write transaction on the
//! user record, so concurrent callers (a purchase and a regeneration tick,
//! two answers submitted back to back) never lose an update. Running out of
//! a resource is a normal `Ok(false)` result; only storage failures are
//! errors.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::regen::RegenPolicy;
use crate::storage::{
    run_user_transaction, DocumentStore, RetryPolicy, StorageResult, TxDecision, UserDocument,
    UserId, UserSubscription,
};
use crate::user::UserState;

pub struct ResourceLedger {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    policy: RegenPolicy,
}

impl ResourceLedger {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
        policy: RegenPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            retry,
            policy,
        }
    }

    pub fn policy(&self) -> &RegenPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Current user record, defaults when the learner has no record yet
    pub async fn resources(&self, uid: &UserId) -> StorageResult<UserDocument> {
        Ok(self.store.read_user(uid).await?.value_or_default())
    }

    /// Full snapshot including achievements
    pub async fn snapshot(&self, uid: &UserId) -> StorageResult<UserState> {
        let user = self.store.read_user(uid).await?;
        let achievements = self.store.list_achievements(uid).await?;
        Ok(UserState::from_documents(
            user.version,
            user.value.unwrap_or_default(),
            achievements,
        ))
    }

    /// Live feed of the learner's record
    pub async fn subscribe(&self, uid: &UserId) -> StorageResult<UserSubscription> {
        self.store.subscribe_user(uid).await
    }

    /// Take one life. Returns false, writing nothing, when none are left.
    pub async fn spend_life(&self, uid: &UserId) -> StorageResult<bool> {
        let clock = Arc::clone(&self.clock);
        let spent = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            let lives = doc.lives();
            if lives == 0 {
                return TxDecision::Abort(false);
            }
            doc.lives = Some(lives - 1);
            doc.last_life_ts = Some(clock.now());
            TxDecision::Commit(doc, true)
        })
        .await?;

        debug!(%uid, spent, "spend life");
        Ok(spent)
    }

    /// Take one hint. Returns false, writing nothing, when none are left.
    pub async fn spend_hint(&self, uid: &UserId) -> StorageResult<bool> {
        let spent = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            let hints = doc.hints();
            if hints == 0 {
                return TxDecision::Abort(false);
            }
            doc.hints = Some(hints - 1);
            TxDecision::Commit(doc, true)
        })
        .await?;

        debug!(%uid, spent, "spend hint");
        Ok(spent)
    }

    pub async fn add_coins(&self, uid: &UserId, amount: u32) -> StorageResult<()> {
        run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            doc.coins = Some(doc.coins().saturating_add(amount));
            TxDecision::Commit(doc, ())
        })
        .await?;
        debug!(%uid, amount, "added coins");
        Ok(())
    }

    /// Credit lives, capped at the configured maximum
    pub async fn add_lives(&self, uid: &UserId, delta: u32) -> StorageResult<()> {
        let max_lives = self.policy.max_lives;
        run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            doc.lives = Some(doc.lives().saturating_add(delta).min(max_lives));
            TxDecision::Commit(doc, ())
        })
        .await?;
        debug!(%uid, delta, "added lives");
        Ok(())
    }

    pub async fn add_hints(&self, uid: &UserId, delta: u32) -> StorageResult<()> {
        run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            doc.hints = Some(doc.hints().saturating_add(delta));
            TxDecision::Commit(doc, ())
        })
        .await?;
        debug!(%uid, delta, "added hints");
        Ok(())
    }

    /// Charge `price` coins and, once the charge has committed, run `grant`
    /// to credit what was bought.
    ///
    /// Returns false without writing anything when the learner cannot
    /// afford it. A failing `grant` is reported as an error; the coins stay
    /// charged.
    pub async fn purchase<G, Fut>(&self, uid: &UserId, price: u32, grant: G) -> StorageResult<bool>
    where
        G: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<()>>,
    {
        let charged = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            let coins = doc.coins();
            if coins < price {
                return TxDecision::Abort(false);
            }
            doc.coins = Some(coins - price);
            TxDecision::Commit(doc, true)
        })
        .await?;

        if !charged {
            debug!(%uid, price, "purchase declined, not enough coins");
            return Ok(false);
        }

        grant().await?;
        info!(%uid, price, "purchase completed");
        Ok(true)
    }

    /// Give back one life if the learner is below the cap and the restore
    /// interval has elapsed since the last life change. Both conditions are
    /// re-checked inside the transaction, so concurrent restores and spends
    /// never over-credit.
    pub async fn restore_life(&self, uid: &UserId) -> StorageResult<bool> {
        let clock = Arc::clone(&self.clock);
        let policy = self.policy.clone();

        let restored = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            let now = clock.now();
            let lives = doc.lives();
            if !policy.is_due(lives, doc.last_life_ts, now) {
                return TxDecision::Abort(false);
            }
            doc.lives = Some(lives + 1);
            doc.last_life_ts = Some(now);
            TxDecision::Commit(doc, true)
        })
        .await?;

        if restored {
            info!(%uid, "restored one life");
        }
        Ok(restored)
    }
}

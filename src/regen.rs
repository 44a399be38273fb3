//! Life regeneration: one life back per restore interval while below the cap
//!
//! [`RegenPolicy`] is the pure countdown rule. [`LifeRegenerator`] applies it
//! on a periodic tick through the ledger, whose restore re-checks the rule
//! inside its transaction, so several loops for one learner never
//! over-credit.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

use crate::config::EconomyConfig;
use crate::ledger::ResourceLedger;
use crate::storage::{StorageResult, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenPolicy {
    pub max_lives: u32,
    pub restore_interval: Duration,
}

impl RegenPolicy {
    pub fn new(max_lives: u32, restore_interval: Duration) -> Self {
        Self {
            max_lives,
            restore_interval,
        }
    }

    pub fn from_economy(economy: &EconomyConfig) -> Self {
        Self::new(economy.max_lives, economy.restore_interval)
    }

    /// Time left until the next life comes back.
    ///
    /// Zero when lives are full or no life has been spent yet. A stamp in
    /// the future counts as no time elapsed.
    pub fn remaining(
        &self,
        lives: u32,
        last_restore: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Duration {
        if lives >= self.max_lives {
            return Duration::ZERO;
        }
        let Some(last) = last_restore else {
            return Duration::ZERO;
        };

        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        self.restore_interval.saturating_sub(elapsed)
    }

    /// Whether a life should be restored right now
    pub fn is_due(&self, lives: u32, last_restore: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        lives < self.max_lives
            && last_restore.is_some()
            && self.remaining(lives, last_restore, now).is_zero()
    }
}

/// Outcome of one regeneration check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Countdown to display after this check
    pub remaining: Duration,
    pub restored: bool,
}

pub struct LifeRegenerator {
    ledger: Arc<ResourceLedger>,
    tick_interval: Duration,
}

impl LifeRegenerator {
    pub fn new(ledger: Arc<ResourceLedger>, tick_interval: Duration) -> Self {
        Self {
            ledger,
            tick_interval,
        }
    }

    /// Run one regeneration check for `uid`
    pub async fn tick(&self, uid: &UserId) -> StorageResult<Tick> {
        let policy = self.ledger.policy();
        let now = self.ledger.clock().now();
        let doc = self.ledger.resources(uid).await?;

        if !policy.is_due(doc.lives(), doc.last_life_ts, now) {
            return Ok(Tick {
                remaining: policy.remaining(doc.lives(), doc.last_life_ts, now),
                restored: false,
            });
        }

        let restored = self.ledger.restore_life(uid).await?;
        let doc = self.ledger.resources(uid).await?;
        Ok(Tick {
            remaining: policy.remaining(doc.lives(), doc.last_life_ts, self.ledger.clock().now()),
            restored,
        })
    }

    /// Start the periodic loop for `uid`. The first check runs immediately.
    ///
    /// The loop stops when the returned handle is cancelled or dropped. A
    /// check already in progress finishes; no check starts afterwards.
    pub fn spawn(self: &Arc<Self>, uid: UserId) -> RegenHandle {
        let (countdown_tx, countdown_rx) = watch::channel(Duration::ZERO);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let regen = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = interval(regen.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(%uid, interval = ?regen.tick_interval, "regeneration loop started");

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => {}
                }

                match regen.tick(&uid).await {
                    Ok(tick) => {
                        countdown_tx.send_replace(tick.remaining);
                    }
                    Err(e) => warn!(%uid, error = %e, "regeneration check failed"),
                }
            }

            debug!(%uid, "regeneration loop stopped");
        });

        RegenHandle {
            countdown: countdown_rx,
            cancel: cancel_tx,
            task,
        }
    }
}

/// Handle to a running regeneration loop
pub struct RegenHandle {
    countdown: watch::Receiver<Duration>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RegenHandle {
    /// Countdown published after every check
    pub fn countdown(&self) -> watch::Receiver<Duration> {
        self.countdown.clone()
    }

    /// Stop the loop and wait for it to exit
    pub async fn cancel(self) {
        self.cancel.send_replace(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "regeneration task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::backends::MemoryBackend;
    use crate::storage::{DocumentStore, RetryPolicy, UserDocument, Version};
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn policy() -> RegenPolicy {
        RegenPolicy::new(10, Duration::from_secs(120))
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_remaining_countdown() {
        let now = noon();
        let p = policy();

        assert_eq!(p.remaining(10, Some(now), now), Duration::ZERO);
        assert_eq!(p.remaining(4, None, now), Duration::ZERO);
        assert_eq!(
            p.remaining(4, Some(now - ChronoDuration::seconds(30)), now),
            Duration::from_secs(90)
        );
        assert_eq!(
            p.remaining(4, Some(now - ChronoDuration::seconds(500)), now),
            Duration::ZERO
        );
        assert_eq!(
            p.remaining(4, Some(now + ChronoDuration::seconds(5)), now),
            Duration::from_secs(120)
        );
    }

    #[test]
    fn test_is_due() {
        let now = noon();
        let p = policy();
        let stale = Some(now - ChronoDuration::seconds(120));

        assert!(p.is_due(9, stale, now));
        assert!(!p.is_due(10, stale, now));
        assert!(!p.is_due(3, None, now));
        assert!(!p.is_due(3, Some(now), now));
    }

    async fn setup(lives: u32, stamp_age_secs: i64) -> (Arc<MemoryBackend>, ManualClock, Arc<LifeRegenerator>, UserId) {
        let store = Arc::new(MemoryBackend::new());
        let clock = ManualClock::new(noon());
        let uid = UserId::from("learner");
        store
            .write_user(
                &uid,
                Version::ABSENT,
                UserDocument {
                    lives: Some(lives),
                    last_life_ts: Some(noon() - ChronoDuration::seconds(stamp_age_secs)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ledger = Arc::new(ResourceLedger::new(
            store.clone(),
            Arc::new(clock.clone()),
            RetryPolicy::default(),
            policy(),
        ));
        let regen = Arc::new(LifeRegenerator::new(ledger, Duration::from_secs(1)));
        (store, clock, regen, uid)
    }

    #[tokio::test]
    async fn test_tick_restores_after_interval() {
        let (store, clock, regen, uid) = setup(5, 130).await;

        let tick = regen.tick(&uid).await.unwrap();

        assert!(tick.restored);
        assert_eq!(tick.remaining, Duration::from_secs(120));
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!(doc.lives(), 6);
        assert_eq!(doc.last_life_ts, Some(clock.now()));
    }

    #[tokio::test]
    async fn test_tick_before_interval_only_reports() {
        let (store, _clock, regen, uid) = setup(5, 100).await;

        let tick = regen.tick(&uid).await.unwrap();

        assert!(!tick.restored);
        assert_eq!(tick.remaining, Duration::from_secs(20));
        assert_eq!(store.read_user(&uid).await.unwrap().version, Version(1));
    }

    #[tokio::test]
    async fn test_long_absence_restores_one_life_per_check() {
        let (store, _clock, regen, uid) = setup(2, 3600).await;

        assert!(regen.tick(&uid).await.unwrap().restored);
        assert!(!regen.tick(&uid).await.unwrap().restored);
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!(doc.lives(), 3);
    }

    #[tokio::test]
    async fn test_restore_stops_at_cap() {
        let (store, _clock, regen, uid) = setup(10, 600).await;

        let tick = regen.tick(&uid).await.unwrap();
        assert!(!tick.restored);
        assert_eq!(tick.remaining, Duration::ZERO);
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().lives(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_publishes_countdown_and_stops_on_cancel() {
        let (store, clock, regen, uid) = setup(5, 130).await;

        let handle = regen.spawn(uid.clone());
        let mut countdown = handle.countdown();
        countdown.changed().await.unwrap();
        assert_eq!(*countdown.borrow(), Duration::from_secs(120));
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().lives(), 6);

        handle.cancel().await;

        clock.advance(ChronoDuration::seconds(600));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().lives(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_loops_do_not_over_credit() {
        let (store, _clock, regen, uid) = setup(9, 130).await;

        let first = regen.spawn(uid.clone());
        let second = regen.spawn(uid.clone());
        tokio::time::sleep(Duration::from_secs(3)).await;

        first.cancel().await;
        second.cancel().await;
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().lives(), 10);
    }
}

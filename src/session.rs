//! Wiring of the core services and a per-lesson session on top of them

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::achievements::AchievementEngine;
use crate::bootstrap::UserBootstrapper;
use crate::clock::{Clock, SystemClock};
use crate::config::CoreConfig;
use crate::course::{CourseCatalog, CourseId, Page, StoreCatalog};
use crate::error::{Error, Result};
use crate::evaluator::{AnswerEvaluator, TestOutcome};
use crate::events::{EventSink, UiEvent};
use crate::ledger::ResourceLedger;
use crate::progress::{Advance, CourseCursor, Position, ProgressTracker};
use crate::regen::{LifeRegenerator, RegenHandle, RegenPolicy};
use crate::shop::{Item, Shop};
use crate::storage::{DocumentStore, StorageFactory, UserId};

/// Every component of the core, sharing one store, clock and event sink
pub struct CoreServices {
    pub config: CoreConfig,
    pub store: Arc<dyn DocumentStore>,
    pub clock: Arc<dyn Clock>,
    pub events: EventSink,
    pub catalog: Arc<dyn CourseCatalog>,
    pub ledger: Arc<ResourceLedger>,
    pub achievements: Arc<AchievementEngine>,
    pub progress: ProgressTracker,
    pub evaluator: AnswerEvaluator,
    pub shop: Shop,
    pub bootstrap: UserBootstrapper,
    pub regen: Arc<LifeRegenerator>,
}

impl CoreServices {
    pub fn new(config: CoreConfig, store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        let retry = config.storage.retry_policy.clone();
        let economy = &config.economy;
        let events = EventSink::new();
        let catalog: Arc<dyn CourseCatalog> = Arc::new(StoreCatalog::new(store.clone()));

        let ledger = Arc::new(ResourceLedger::new(
            store.clone(),
            clock.clone(),
            retry.clone(),
            RegenPolicy::from_economy(economy),
        ));
        let achievements = Arc::new(AchievementEngine::new(
            store.clone(),
            catalog.clone(),
            clock.clone(),
            retry.clone(),
            config.achievements.courses.clone(),
        ));
        let progress = ProgressTracker::new(
            store.clone(),
            catalog.clone(),
            achievements.clone(),
            retry.clone(),
        );
        let evaluator =
            AnswerEvaluator::new(ledger.clone(), events.clone(), economy.correct_answer_reward);
        let shop = Shop::new(ledger.clone(), events.clone(), economy);
        let bootstrap =
            UserBootstrapper::new(store.clone(), clock.clone(), retry, economy.clone());
        let regen = Arc::new(LifeRegenerator::new(ledger.clone(), economy.tick_interval));

        Self {
            config,
            store,
            clock,
            events,
            catalog,
            ledger,
            achievements,
            progress,
            evaluator,
            shop,
            bootstrap,
            regen,
        }
    }

    /// Build the services on the configured storage backend and the
    /// system clock
    pub async fn from_config(config: CoreConfig) -> Result<Self> {
        let store = StorageFactory::from_config(&config.storage).await?;
        Ok(Self::new(config, store, Arc::new(SystemClock)))
    }
}

/// What happened when the learner pressed "next"
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    Moved(Advance),
    /// Navigation is locked while the learner has no lives
    NoLives,
}

/// One learner working through one course
pub struct LessonSession {
    services: Arc<CoreServices>,
    uid: UserId,
    course: CourseId,
    cursor: CourseCursor,
    regen: Option<RegenHandle>,
}

impl LessonSession {
    /// Fill missing resources, give back a life that is due and restore
    /// the saved position
    pub async fn open(services: Arc<CoreServices>, uid: UserId, course: CourseId) -> Result<Self> {
        services.bootstrap.ensure_stats(&uid).await?;
        services.regen.tick(&uid).await?;
        let cursor = services.progress.load(&uid, &course).await?;
        services
            .progress
            .finish_on_final_page(&uid, &course, &cursor)
            .await?;
        info!(%uid, %course, position = ?cursor.position, "lesson session opened");

        Ok(Self {
            services,
            uid,
            course,
            cursor,
            regen: None,
        })
    }

    pub fn uid(&self) -> &UserId {
        &self.uid
    }

    pub fn course(&self) -> &CourseId {
        &self.course
    }

    pub fn position(&self) -> Position {
        self.cursor.position
    }

    pub fn cursor(&self) -> &CourseCursor {
        &self.cursor
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.cursor.current_page()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor.is_finished()
    }

    fn page(&self) -> Result<Page> {
        self.cursor.current_page().cloned().ok_or(Error::CourseFinished)
    }

    /// Move forward one page unless the learner is out of lives
    pub async fn next(&mut self) -> Result<NextOutcome> {
        let resources = self.services.ledger.resources(&self.uid).await?;
        if resources.lives() == 0 {
            self.services.events.emit(UiEvent::NoLives);
            return Ok(NextOutcome::NoLives);
        }

        let step = self
            .services
            .progress
            .next(&self.uid, &self.course, &mut self.cursor)
            .await?;
        debug!(uid = %self.uid, course = %self.course, ?step, "advanced");
        if step != Advance::Terminal {
            self.services
                .progress
                .finish_on_final_page(&self.uid, &self.course, &self.cursor)
                .await?;
        }
        Ok(NextOutcome::Moved(step))
    }

    pub async fn answer(&self, chosen: usize) -> Result<TestOutcome> {
        let page = self.page()?;
        self.services.evaluator.submit_test(&self.uid, &page, chosen).await
    }

    pub async fn submit_code(&self, code: &str) -> Result<bool> {
        let page = self.page()?;
        self.services.evaluator.submit_coding(&self.uid, &page, code).await
    }

    pub async fn hint(&self) -> Result<Option<String>> {
        let page = self.page()?;
        self.services.evaluator.request_hint(&self.uid, &page).await
    }

    pub async fn buy(&self, item: Item) -> Result<bool> {
        Ok(self.services.shop.buy(&self.uid, item).await?)
    }

    /// Start the regeneration loop for this session's learner. Returns the
    /// countdown feed; starting twice reuses the running loop.
    pub fn start_regen(&mut self) -> watch::Receiver<Duration> {
        let services = &self.services;
        let uid = &self.uid;
        self.regen
            .get_or_insert_with(|| services.regen.spawn(uid.clone()))
            .countdown()
    }

    /// End the session, stopping its regeneration loop
    pub async fn close(mut self) {
        if let Some(handle) = self.regen.take() {
            handle.cancel().await;
        }
        debug!(uid = %self.uid, course = %self.course, "lesson session closed");
    }
}

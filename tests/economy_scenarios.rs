//! End-to-end scenarios over the wired core services

mod common;

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

use common::TestCore;
use kvantor::achievements::{AchievementId, JS_SAMURAI, WELCOME};
use kvantor::clock::Clock;
use kvantor::config::CoreConfig;
use kvantor::course::{CourseId, Page};
use kvantor::evaluator::TestOutcome;
use kvantor::events::UiEvent;
use kvantor::progress::{Advance, Position};
use kvantor::session::{CoreServices, LessonSession, NextOutcome};
use kvantor::storage::{StorageConfig, StorageFactory, UserDocument, UserId, Version};

fn contended_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.storage.retry_policy.max_retries = 200;
    config.storage.retry_policy.initial_delay = Duration::from_millis(1);
    config.storage.retry_policy.max_delay = Duration::from_millis(10);
    config
}

async fn write_user(core: &TestCore, uid: &UserId, doc: UserDocument) {
    let current = core.services.store.read_user(uid).await.unwrap();
    core.services
        .store
        .write_user(uid, current.version, doc)
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_spends_never_go_below_zero() {
    let core = TestCore::with_config(contended_config());
    let uid = UserId::from("racer");
    core.services
        .bootstrap
        .create_user_skeleton(&uid, "racer", "hare")
        .await
        .unwrap();

    let tasks: Vec<_> = (0..20)
        .map(|_| {
            let ledger = core.services.ledger.clone();
            let uid = uid.clone();
            tokio::spawn(async move { ledger.spend_life(&uid).await.unwrap() })
        })
        .collect();

    let mut spent = 0;
    for task in tasks {
        if task.await.unwrap() {
            spent += 1;
        }
    }

    assert_eq!(spent, 5);
    assert_eq!(core.services.ledger.resources(&uid).await.unwrap().lives(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_credits_and_spends_stay_in_bounds() {
    let core = TestCore::with_config(contended_config());
    let uid = UserId::from("racer");
    write_user(
        &core,
        &uid,
        UserDocument {
            lives: Some(8),
            coins: Some(1_000),
            last_life_ts: Some(core.clock.now() - ChronoDuration::seconds(600)),
            ..Default::default()
        },
    )
    .await;

    let mut tasks = Vec::new();
    for n in 0..30 {
        let services = core.services.clone();
        let uid = uid.clone();
        tasks.push(tokio::spawn(async move {
            match n % 3 {
                0 => {
                    services.ledger.restore_life(&uid).await.unwrap();
                }
                1 => {
                    services.shop.buy_life(&uid).await.unwrap();
                }
                _ => {
                    services.ledger.spend_life(&uid).await.unwrap();
                }
            }
            let lives = services.ledger.resources(&uid).await.unwrap().lives();
            assert!(lives <= 10, "lives above cap: {}", lives);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let doc = core.services.ledger.resources(&uid).await.unwrap();
    assert!(doc.lives() <= 10);
    assert_eq!(doc.coins(), 1_000 - 10 * 30);
}

#[tokio::test]
async fn wrong_answers_with_one_life() {
    let core = TestCore::new();
    let uid = UserId::from("learner");
    write_user(
        &core,
        &uid,
        UserDocument {
            lives: Some(1),
            hints: Some(0),
            coins: Some(5),
            ..Default::default()
        },
    )
    .await;
    let mut events = core.services.events.subscribe();
    let page = Page::Test {
        question: "Which keyword defines a function?".to_string(),
        answers: vec!["fn".to_string(), "def".to_string()],
        correct_answer_index: 1,
        hint: None,
    };

    let first = core.services.evaluator.submit_test(&uid, &page, 0).await.unwrap();
    assert_eq!(first, TestOutcome::Wrong);
    let doc = core.services.ledger.resources(&uid).await.unwrap();
    assert_eq!((doc.lives(), doc.coins()), (0, 5));

    let second = core.services.evaluator.submit_test(&uid, &page, 0).await.unwrap();
    assert_eq!(second, TestOutcome::NoLives);
    assert_eq!(events.recv().await.unwrap(), UiEvent::NoLives);
    assert_eq!(core.services.ledger.resources(&uid).await.unwrap().lives(), 0);
}

#[tokio::test]
async fn regeneration_restores_after_interval() {
    let core = TestCore::new();
    let uid = UserId::from("learner");
    write_user(
        &core,
        &uid,
        UserDocument {
            lives: Some(5),
            last_life_ts: Some(core.clock.now() - ChronoDuration::seconds(130)),
            ..Default::default()
        },
    )
    .await;

    let tick = core.services.regen.tick(&uid).await.unwrap();

    assert!(tick.restored);
    let doc = core.services.ledger.resources(&uid).await.unwrap();
    assert_eq!(doc.lives(), 6);
    assert_eq!(doc.last_life_ts, Some(core.clock.now()));
}

#[tokio::test]
async fn finishing_javascript_unlocks_samurai_once() {
    let core = TestCore::new();
    core.seed_course("javascript", 6).await;
    let uid = UserId::from("learner");
    let course = CourseId::from("javascript");
    core.services
        .bootstrap
        .create_user_skeleton(&uid, "ada", "owl")
        .await
        .unwrap();

    let mut done = UserDocument::default();
    done.completed_modules = (1..=5)
        .map(|n| format!("javascript-{:02}", n).as_str().into())
        .collect();
    done.progress.insert(course.clone(), Position::new(5, 0));
    let current = core.services.store.read_user(&uid).await.unwrap();
    let mut doc = current.value.unwrap();
    doc.merge(done);
    core.services
        .store
        .write_user(&uid, current.version, doc)
        .await
        .unwrap();

    let mut session = LessonSession::open(core.services.clone(), uid.clone(), course.clone())
        .await
        .unwrap();
    assert_eq!(session.position(), Position::new(5, 0));

    session.next().await.unwrap();
    let finished = session.next().await.unwrap();
    assert_eq!(
        finished,
        NextOutcome::Moved(Advance::Finished {
            completed: "javascript-06".into()
        })
    );
    assert_eq!(session.next().await.unwrap(), NextOutcome::Moved(Advance::Terminal));

    assert!(!core
        .services
        .achievements
        .unlock_achievement(&uid, &AchievementId::new(JS_SAMURAI))
        .await
        .unwrap());
    let state = core.services.ledger.snapshot(&uid).await.unwrap();
    assert!(state.is_unlocked(&AchievementId::new(JS_SAMURAI)));
    assert!(state.is_unlocked(&AchievementId::new(WELCOME)));
    assert_eq!(state.completed_modules.len(), 6);
    session.close().await;
}

#[tokio::test]
async fn subscription_sees_committed_changes() {
    let core = TestCore::new();
    let uid = UserId::from("watcher");
    core.services
        .bootstrap
        .create_user_skeleton(&uid, "watcher", "cat")
        .await
        .unwrap();

    let mut stream = core.services.ledger.subscribe(&uid).await.unwrap().into_stream();
    let initial = stream.next().await.unwrap();
    assert_eq!(initial.value.unwrap().lives(), 5);

    core.services.ledger.spend_life(&uid).await.unwrap();
    let after = stream.next().await.unwrap();
    assert_eq!(after.value.unwrap().lives(), 4);
    assert!(after.version > initial.version);
}

#[tokio::test]
async fn file_store_keeps_state_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = CoreConfig::default();
    config.storage = StorageConfig::file(dir.path());
    let uid = UserId::from("durable");

    {
        let services = CoreServices::from_config(config.clone()).await.unwrap();
        services
            .bootstrap
            .create_user_skeleton(&uid, "durable", "turtle")
            .await
            .unwrap();
        services.ledger.add_coins(&uid, 40).await.unwrap();
        assert!(services.shop.buy_hint(&uid).await.unwrap());
    }

    let store = StorageFactory::from_config(&config.storage).await.unwrap();
    let stored = store.read_user(&uid).await.unwrap();
    let doc = stored.value.unwrap();
    assert_eq!((doc.lives(), doc.hints(), doc.coins()), (5, 4, 20));
    assert!(stored.version > Version::ABSENT);
    assert_eq!(store.list_achievements(&uid).await.unwrap().len(), 3);

    let services = Arc::new(CoreServices::from_config(config).await.unwrap());
    let state = services.ledger.snapshot(&uid).await.unwrap();
    assert_eq!(state.nickname.as_deref(), Some("durable"));
}

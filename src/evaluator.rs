//! Scoring of test answers and coding submissions

use std::sync::Arc;
use tracing::debug;

use crate::course::Page;
use crate::error::{Error, Result};
use crate::events::{EventSink, UiEvent};
use crate::ledger::ResourceLedger;
use crate::storage::UserId;

/// Whether `chosen` is the correct answer of a test page
pub fn evaluate_test(page: &Page, chosen: usize) -> Result<bool> {
    match page {
        Page::Test {
            correct_answer_index,
            ..
        } => Ok(chosen == *correct_answer_index),
        other => Err(Error::WrongPage {
            expected: "test",
            found: other.kind(),
        }),
    }
}

/// Whether `submitted` matches the expected code, ignoring surrounding
/// whitespace. Literal comparison only; the code is never run.
pub fn evaluate_coding(page: &Page, submitted: &str) -> Result<bool> {
    match page {
        Page::CodingTask { expected_code, .. } => Ok(submitted.trim() == expected_code.trim()),
        other => Err(Error::WrongPage {
            expected: "coding",
            found: other.kind(),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOutcome {
    /// Right answer, coins awarded
    Correct { reward: u32 },
    /// Wrong answer, one life taken
    Wrong,
    /// Wrong answer and no life left to take
    NoLives,
}

impl TestOutcome {
    pub fn is_correct(&self) -> bool {
        matches!(self, TestOutcome::Correct { .. })
    }
}

/// Applies the ledger effects of answers and hint requests
pub struct AnswerEvaluator {
    ledger: Arc<ResourceLedger>,
    events: EventSink,
    reward: u32,
}

impl AnswerEvaluator {
    pub fn new(ledger: Arc<ResourceLedger>, events: EventSink, reward: u32) -> Self {
        Self {
            ledger,
            events,
            reward,
        }
    }

    pub async fn submit_test(&self, uid: &UserId, page: &Page, chosen: usize) -> Result<TestOutcome> {
        if evaluate_test(page, chosen)? {
            self.ledger.add_coins(uid, self.reward).await?;
            debug!(%uid, reward = self.reward, "correct answer");
            return Ok(TestOutcome::Correct {
                reward: self.reward,
            });
        }

        if self.ledger.spend_life(uid).await? {
            debug!(%uid, "wrong answer, life spent");
            Ok(TestOutcome::Wrong)
        } else {
            self.events.emit(UiEvent::NoLives);
            Ok(TestOutcome::NoLives)
        }
    }

    /// Check a coding submission. Has no effect on resources.
    pub async fn submit_coding(&self, uid: &UserId, page: &Page, code: &str) -> Result<bool> {
        let passed = evaluate_coding(page, code)?;
        debug!(%uid, passed, "coding task checked");
        Ok(passed)
    }

    /// Reveal the hint of `page` in exchange for one hint.
    ///
    /// Returns `None` and emits [`UiEvent::NoHints`] when the learner has
    /// none left. A page without a hint costs nothing.
    pub async fn request_hint(&self, uid: &UserId, page: &Page) -> Result<Option<String>> {
        let Some(hint) = page.hint() else {
            return Ok(None);
        };

        if self.ledger.spend_hint(uid).await? {
            Ok(Some(hint.to_string()))
        } else {
            self.events.emit(UiEvent::NoHints);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::regen::RegenPolicy;
    use crate::storage::backends::MemoryBackend;
    use crate::storage::{DocumentStore, RetryPolicy, UserDocument, Version};
    use std::time::Duration;

    fn test_page() -> Page {
        Page::Test {
            question: "2 + 2?".to_string(),
            answers: vec!["3".to_string(), "4".to_string()],
            correct_answer_index: 1,
            hint: Some("Count on your fingers".to_string()),
        }
    }

    fn coding_page() -> Page {
        Page::CodingTask {
            description: "Print hello".to_string(),
            expected_code: "print(\"hello\")".to_string(),
            hint: None,
        }
    }

    async fn setup(lives: u32, hints: u32, coins: u32) -> (Arc<MemoryBackend>, AnswerEvaluator, EventSink, UserId) {
        let store = Arc::new(MemoryBackend::new());
        let uid = UserId::from("learner");
        store
            .write_user(
                &uid,
                Version::ABSENT,
                UserDocument {
                    lives: Some(lives),
                    hints: Some(hints),
                    coins: Some(coins),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let ledger = Arc::new(ResourceLedger::new(
            store.clone(),
            Arc::new(SystemClock),
            RetryPolicy::default(),
            RegenPolicy::new(10, Duration::from_secs(120)),
        ));
        let events = EventSink::new();
        let evaluator = AnswerEvaluator::new(ledger, events.clone(), 10);
        (store, evaluator, events, uid)
    }

    #[test]
    fn test_evaluate_test_compares_index() {
        assert!(evaluate_test(&test_page(), 1).unwrap());
        assert!(!evaluate_test(&test_page(), 0).unwrap());
        assert!(matches!(
            evaluate_test(&coding_page(), 0),
            Err(Error::WrongPage { expected: "test", found: "coding" })
        ));
    }

    #[test]
    fn test_evaluate_coding_trims_both_sides() {
        assert!(evaluate_coding(&coding_page(), "  print(\"hello\")\n").unwrap());
        assert!(!evaluate_coding(&coding_page(), "print('hello')").unwrap());
        assert!(!evaluate_coding(&coding_page(), "print(\"hello\") # done").unwrap());
    }

    #[tokio::test]
    async fn test_correct_answer_awards_coins() {
        let (store, evaluator, _events, uid) = setup(3, 0, 0).await;

        let outcome = evaluator.submit_test(&uid, &test_page(), 1).await.unwrap();

        assert_eq!(outcome, TestOutcome::Correct { reward: 10 });
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.coins()), (3, 10));
    }

    #[tokio::test]
    async fn test_wrong_answers_until_no_lives() {
        let (store, evaluator, events, uid) = setup(1, 0, 5).await;
        let mut rx = events.subscribe();

        let first = evaluator.submit_test(&uid, &test_page(), 0).await.unwrap();
        assert_eq!(first, TestOutcome::Wrong);
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.coins()), (0, 5));

        let second = evaluator.submit_test(&uid, &test_page(), 0).await.unwrap();
        assert_eq!(second, TestOutcome::NoLives);
        assert_eq!(rx.recv().await.unwrap(), UiEvent::NoLives);
        let doc = store.read_user(&uid).await.unwrap().value.unwrap();
        assert_eq!((doc.lives(), doc.coins()), (0, 5));
    }

    #[tokio::test]
    async fn test_hint_costs_one_hint() {
        let (store, evaluator, events, uid) = setup(1, 1, 0).await;
        let mut rx = events.subscribe();

        let hint = evaluator.request_hint(&uid, &test_page()).await.unwrap();
        assert_eq!(hint.as_deref(), Some("Count on your fingers"));

        assert!(evaluator.request_hint(&uid, &test_page()).await.unwrap().is_none());
        assert_eq!(rx.recv().await.unwrap(), UiEvent::NoHints);
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().hints(), 0);
    }

    #[tokio::test]
    async fn test_page_without_hint_is_free() {
        let (store, evaluator, _events, uid) = setup(1, 2, 0).await;

        assert!(evaluator.request_hint(&uid, &coding_page()).await.unwrap().is_none());
        assert_eq!(store.read_user(&uid).await.unwrap().value.unwrap().hints(), 2);
    }

    #[tokio::test]
    async fn test_coding_submission_leaves_resources() {
        let (store, evaluator, _events, uid) = setup(2, 0, 0).await;

        assert!(!evaluator.submit_coding(&uid, &coding_page(), "nope").await.unwrap());
        assert_eq!(store.read_user(&uid).await.unwrap().version, Version(1));
    }
}

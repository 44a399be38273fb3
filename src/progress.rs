//! Per-course reading position with clamped restore
//!
//! A position is a `(module_index, page_index)` pair. Advancing past the
//! last page of the last module reaches the terminal state, where
//! `module_index` equals the module count; advancing there again is a no-op.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::achievements::AchievementEngine;
use crate::course::{CourseCatalog, CourseId, Module, ModuleId, Page};
use crate::storage::{
    run_user_transaction, DocumentStore, RetryPolicy, StorageResult, TxDecision, UserId,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default)]
    pub module_index: usize,
    #[serde(default)]
    pub page_index: usize,
}

impl Position {
    pub fn new(module_index: usize, page_index: usize) -> Self {
        Self {
            module_index,
            page_index,
        }
    }

    /// Pull a stored position back inside `modules`.
    ///
    /// Course content may have shrunk since the position was saved, so the
    /// module index is capped at the last module and the page index at the
    /// last page of that module. Both are 0 when there is nothing to point at.
    pub fn clamp(self, modules: &[Module]) -> Position {
        let module_index = self.module_index.min(modules.len().saturating_sub(1));
        let page_index = modules
            .get(module_index)
            .map(|module| self.page_index.min(module.last_page_index()))
            .unwrap_or(0);
        Position::new(module_index, page_index)
    }
}

/// A loaded course together with the learner's place in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseCursor {
    pub modules: Vec<Module>,
    pub position: Position,
}

impl CourseCursor {
    pub fn new(modules: Vec<Module>, position: Position) -> Self {
        Self { modules, position }
    }

    pub fn current_module(&self) -> Option<&Module> {
        self.modules.get(self.position.module_index)
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.current_module()?.pages.get(self.position.page_index)
    }

    /// True once every module has been traversed
    pub fn is_finished(&self) -> bool {
        self.position.module_index >= self.modules.len()
    }

    pub fn is_last_module(&self) -> bool {
        self.position.module_index + 1 == self.modules.len()
    }
}

/// Result of one [`advance`] step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    /// Moved to the next page of the same module
    Page,
    /// Finished a module and moved to the first page of the next one
    Module { completed: ModuleId },
    /// Finished the last module; the cursor is now terminal
    Finished { completed: ModuleId },
    /// Already terminal, nothing changed
    Terminal,
}

impl Advance {
    /// The module this step completed, if any
    pub fn completed(&self) -> Option<&ModuleId> {
        match self {
            Advance::Module { completed } | Advance::Finished { completed } => Some(completed),
            Advance::Page | Advance::Terminal => None,
        }
    }
}

/// Move the cursor one page forward
pub fn advance(cursor: &mut CourseCursor) -> Advance {
    let Some(module) = cursor.current_module() else {
        return Advance::Terminal;
    };

    if cursor.position.page_index + 1 < module.pages.len() {
        cursor.position.page_index += 1;
        return Advance::Page;
    }

    let completed = module.id.clone();
    cursor.position = Position::new(cursor.position.module_index + 1, 0);
    if cursor.is_finished() {
        Advance::Finished { completed }
    } else {
        Advance::Module { completed }
    }
}

/// Loads, advances and persists course positions
pub struct ProgressTracker {
    store: Arc<dyn DocumentStore>,
    catalog: Arc<dyn CourseCatalog>,
    achievements: Arc<AchievementEngine>,
    retry: RetryPolicy,
}

impl ProgressTracker {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        catalog: Arc<dyn CourseCatalog>,
        achievements: Arc<AchievementEngine>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            catalog,
            achievements,
            retry,
        }
    }

    /// Load a course and the learner's clamped position in it
    pub async fn load(&self, uid: &UserId, course: &CourseId) -> StorageResult<CourseCursor> {
        let modules = self.catalog.load_course(course).await?;
        let user = self.store.read_user(uid).await?.value_or_default();
        let saved = user.progress.get(course).copied().unwrap_or_default();
        let position = saved.clamp(&modules);

        if position != saved {
            debug!(%uid, %course, ?saved, ?position, "clamped stale progress");
        }
        Ok(CourseCursor::new(modules, position))
    }

    /// Store `position` under `course`, leaving other courses alone
    pub async fn save(&self, uid: &UserId, course: &CourseId, position: Position) -> StorageResult<()> {
        run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            if doc.progress.get(course) == Some(&position) {
                return TxDecision::Abort(());
            }
            doc.progress.insert(course.clone(), position);
            TxDecision::Commit(doc, ())
        })
        .await
    }

    /// Add `module` to the completed set. Returns false when it was
    /// already there.
    pub async fn record_completion(&self, uid: &UserId, module: &ModuleId) -> StorageResult<bool> {
        let added = run_user_transaction(self.store.as_ref(), &self.retry, uid, |mut doc| {
            if doc.completed_modules.contains(module) {
                return TxDecision::Abort(false);
            }
            doc.completed_modules.insert(module.clone());
            TxDecision::Commit(doc, true)
        })
        .await?;

        if added {
            info!(%uid, %module, "module completed");
        }
        Ok(added)
    }

    /// Advance the cursor and persist the outcome. A completed module is
    /// recorded and triggers the course completion check.
    pub async fn next(
        &self,
        uid: &UserId,
        course: &CourseId,
        cursor: &mut CourseCursor,
    ) -> StorageResult<Advance> {
        let step = advance(cursor);
        if step == Advance::Terminal {
            return Ok(step);
        }

        if let Some(module) = step.completed() {
            self.record_completion(uid, module).await?;
        }
        self.save(uid, course, cursor.position).await?;
        if step.completed().is_some() {
            self.achievements.check_course_completed(uid, course).await?;
        }
        Ok(step)
    }

    /// Reaching the final page of the last module finishes the course: the
    /// module is recorded and the course achievement check runs right away.
    /// Returns whether the course is complete; false on any other page.
    pub async fn finish_on_final_page(
        &self,
        uid: &UserId,
        course: &CourseId,
        cursor: &CourseCursor,
    ) -> StorageResult<bool> {
        if !cursor.is_last_module() || !matches!(cursor.current_page(), Some(Page::Final { .. })) {
            return Ok(false);
        }
        let Some(module) = cursor.current_module() else {
            return Ok(false);
        };

        self.record_completion(uid, &module.id).await?;
        self.achievements.check_course_completed(uid, course).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::{AchievementId, JS_SAMURAI};
    use crate::clock::ManualClock;
    use crate::config::AchievementConfig;
    use crate::course::StoreCatalog;
    use crate::storage::backends::MemoryBackend;
    use crate::storage::{ModuleDocument, PageDocument, UserDocument, Version};
    use chrono::Utc;

    fn module(id: &str, pages: usize) -> Module {
        Module {
            id: ModuleId::from(id),
            title: id.to_uppercase(),
            pages: (0..pages)
                .map(|n| Page::Theory {
                    text: format!("page {}", n),
                })
                .collect(),
        }
    }

    fn six_modules() -> Vec<Module> {
        (1..=6).map(|n| module(&format!("m{}", n), 3)).collect()
    }

    #[test]
    fn test_clamp_out_of_range_module() {
        let modules = six_modules();
        assert_eq!(Position::new(50, 0).clamp(&modules), Position::new(5, 0));
        assert_eq!(Position::new(2, 9).clamp(&modules), Position::new(2, 2));
        assert_eq!(Position::new(6, 0).clamp(&modules), Position::new(5, 0));
    }

    #[test]
    fn test_clamp_empty_content() {
        assert_eq!(Position::new(3, 4).clamp(&[]), Position::new(0, 0));
        assert_eq!(
            Position::new(0, 4).clamp(&[module("empty", 0)]),
            Position::new(0, 0)
        );
    }

    #[test]
    fn test_advance_walks_pages_then_modules() {
        let mut cursor = CourseCursor::new(vec![module("a", 2), module("b", 1)], Position::default());

        assert_eq!(advance(&mut cursor), Advance::Page);
        assert_eq!(cursor.position, Position::new(0, 1));

        assert_eq!(
            advance(&mut cursor),
            Advance::Module {
                completed: ModuleId::from("a")
            }
        );
        assert_eq!(cursor.position, Position::new(1, 0));
        assert!(cursor.is_last_module());

        assert_eq!(
            advance(&mut cursor),
            Advance::Finished {
                completed: ModuleId::from("b")
            }
        );
        assert!(cursor.is_finished());
        assert_eq!(cursor.position, Position::new(2, 0));
        assert!(cursor.current_page().is_none());

        assert_eq!(advance(&mut cursor), Advance::Terminal);
        assert_eq!(cursor.position, Position::new(2, 0));
    }

    #[test]
    fn test_advance_through_empty_module() {
        let mut cursor = CourseCursor::new(vec![module("a", 0), module("b", 1)], Position::default());
        assert_eq!(
            advance(&mut cursor),
            Advance::Module {
                completed: ModuleId::from("a")
            }
        );
    }

    #[test]
    fn test_position_serializes_camel_case() {
        let json = serde_json::to_value(Position::new(2, 7)).unwrap();
        assert_eq!(json, serde_json::json!({"moduleIndex": 2, "pageIndex": 7}));
    }

    struct Fixture {
        store: Arc<MemoryBackend>,
        tracker: ProgressTracker,
        uid: UserId,
        course: CourseId,
    }

    async fn fixture(modules: &[(&str, usize)]) -> Fixture {
        let store = Arc::new(MemoryBackend::new());
        let course = CourseId::from("javascript");
        store
            .put_modules(
                &course,
                modules
                    .iter()
                    .map(|(id, pages)| ModuleDocument {
                        id: id.to_string(),
                        title: id.to_string(),
                        pages: (0..*pages)
                            .map(|_| PageDocument {
                                kind: "theory".to_string(),
                                ..Default::default()
                            })
                            .collect(),
                    })
                    .collect(),
            )
            .await
            .unwrap();

        let catalog: Arc<dyn CourseCatalog> = Arc::new(StoreCatalog::new(store.clone()));
        let engine = Arc::new(AchievementEngine::new(
            store.clone(),
            catalog.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            RetryPolicy::default(),
            AchievementConfig::default().courses,
        ));
        let tracker = ProgressTracker::new(store.clone(), catalog, engine, RetryPolicy::default());

        Fixture {
            store,
            tracker,
            uid: UserId::from("learner"),
            course,
        }
    }

    #[tokio::test]
    async fn test_load_clamps_saved_position() {
        let f = fixture(&[("m1", 2), ("m2", 2), ("m3", 2), ("m4", 2), ("m5", 2), ("m6", 2)]).await;
        let mut doc = UserDocument::default();
        doc.progress.insert(f.course.clone(), Position::new(50, 0));
        f.store.write_user(&f.uid, Version::ABSENT, doc).await.unwrap();

        let cursor = f.tracker.load(&f.uid, &f.course).await.unwrap();
        assert_eq!(cursor.position, Position::new(5, 0));
        assert_eq!(cursor.modules.len(), 6);
    }

    #[tokio::test]
    async fn test_save_keeps_other_courses() {
        let f = fixture(&[("m1", 1)]).await;
        let python = CourseId::from("python");

        f.tracker.save(&f.uid, &python, Position::new(3, 1)).await.unwrap();
        f.tracker.save(&f.uid, &f.course, Position::new(0, 0)).await.unwrap();

        let doc = f.store.read_user(&f.uid).await.unwrap().value.unwrap();
        assert_eq!(doc.progress[&python], Position::new(3, 1));
        assert_eq!(doc.progress[&f.course], Position::new(0, 0));
    }

    #[tokio::test]
    async fn test_next_to_terminal_records_each_module_once() {
        let f = fixture(&[("m1", 2), ("m2", 1)]).await;
        let mut cursor = f.tracker.load(&f.uid, &f.course).await.unwrap();

        for _ in 0..6 {
            f.tracker.next(&f.uid, &f.course, &mut cursor).await.unwrap();
        }

        assert!(cursor.is_finished());
        let doc = f.store.read_user(&f.uid).await.unwrap().value.unwrap();
        let completed: Vec<&str> = doc.completed_modules.iter().map(|m| m.as_str()).collect();
        assert_eq!(completed, vec!["m1", "m2"]);
        assert_eq!(doc.progress[&f.course], Position::new(2, 0));

        let reloaded = f.tracker.load(&f.uid, &f.course).await.unwrap();
        assert_eq!(reloaded.position, Position::new(1, 0));
    }

    #[tokio::test]
    async fn test_finishing_course_unlocks_achievement() {
        let f = fixture(&[("m1", 1)]).await;
        let mut cursor = f.tracker.load(&f.uid, &f.course).await.unwrap();

        let step = f.tracker.next(&f.uid, &f.course, &mut cursor).await.unwrap();
        assert!(matches!(step, Advance::Finished { .. }));

        let achievements = f.store.list_achievements(&f.uid).await.unwrap();
        assert!(achievements[&AchievementId::new(JS_SAMURAI)].unlocked);
    }

    #[tokio::test]
    async fn test_record_completion_is_idempotent() {
        let f = fixture(&[("m1", 1)]).await;
        let module = ModuleId::from("m1");

        assert!(f.tracker.record_completion(&f.uid, &module).await.unwrap());
        assert!(!f.tracker.record_completion(&f.uid, &module).await.unwrap());
        assert_eq!(f.store.read_user(&f.uid).await.unwrap().version, Version(1));
    }
}

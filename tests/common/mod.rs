//! Shared fixtures for integration tests

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use kvantor::clock::ManualClock;
use kvantor::config::CoreConfig;
use kvantor::course::CourseId;
use kvantor::session::CoreServices;
use kvantor::storage::backends::MemoryBackend;
use kvantor::storage::{DocumentStore, ModuleDocument, PageDocument};

/// Core services on an in-memory store with a hand-driven clock
pub struct TestCore {
    pub services: Arc<CoreServices>,
    pub clock: ManualClock,
}

impl TestCore {
    pub fn new() -> Self {
        Self::with_config(CoreConfig::default())
    }

    pub fn with_config(config: CoreConfig) -> Self {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryBackend::new());
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 1, 8, 0, 0).unwrap());
        let services = Arc::new(CoreServices::new(config, store, Arc::new(clock.clone())));
        Self { services, clock }
    }

    /// Store a course of `modules` modules, each a theory page followed by
    /// a final page
    pub async fn seed_course(&self, course: &str, modules: usize) {
        self.services
            .store
            .put_modules(&CourseId::from(course), course_documents(course, modules))
            .await
            .unwrap();
    }
}

pub fn page(kind: &str) -> PageDocument {
    PageDocument {
        kind: kind.to_string(),
        ..Default::default()
    }
}

pub fn course_documents(course: &str, modules: usize) -> Vec<ModuleDocument> {
    (1..=modules)
        .map(|n| ModuleDocument {
            id: format!("{}-{:02}", course, n),
            title: format!("{} module {}", course, n),
            pages: vec![
                PageDocument {
                    text: Some(format!("Lesson {}", n)),
                    ..page("theory")
                },
                page("final"),
            ],
        })
        .collect()
}

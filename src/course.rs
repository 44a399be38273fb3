//! Course catalog: modules, pages and their lenient decoding
//!
//! A course is an ordered list of modules, loaded wholesale and treated as
//! read-only. Module documents come from the document store; pages are
//! decoded from a `type`-tagged record and unknown page types are dropped
//! rather than failing the whole module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::storage::{DocumentStore, ModuleDocument, PageDocument, StorageResult};

/// Shown on a final page whose document carries no message
pub const DEFAULT_FINAL_MESSAGE: &str = "Congratulations! You have finished the module.";

/// Course identifier, e.g. `python` or `javascript`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub String);

impl CourseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CourseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Module identifier, unique within the catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(pub String);

impl ModuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// One unit of course content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    Theory {
        text: String,
    },
    Test {
        question: String,
        answers: Vec<String>,
        correct_answer_index: usize,
        hint: Option<String>,
    },
    CodingTask {
        description: String,
        expected_code: String,
        hint: Option<String>,
    },
    Final {
        message: String,
    },
}

impl Page {
    /// Short name of the page variant, for logs and errors
    pub fn kind(&self) -> &'static str {
        match self {
            Page::Theory { .. } => "theory",
            Page::Test { .. } => "test",
            Page::CodingTask { .. } => "coding",
            Page::Final { .. } => "final",
        }
    }

    /// Hint text of a test or coding page
    pub fn hint(&self) -> Option<&str> {
        match self {
            Page::Test { hint, .. } | Page::CodingTask { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

/// An ordered sequence of pages with a title and id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub id: ModuleId,
    pub title: String,
    pub pages: Vec<Page>,
}

impl Module {
    /// Decode a stored module, skipping pages that cannot be decoded
    pub fn from_document(doc: ModuleDocument) -> Self {
        let module_id = doc.id;
        let pages = doc
            .pages
            .into_iter()
            .filter_map(|page| {
                let decoded = decode_page(&page);
                if decoded.is_none() {
                    warn!(module = %module_id, kind = %page.kind, "skipping page of unknown type");
                }
                decoded
            })
            .collect();

        Self {
            id: ModuleId(module_id),
            title: doc.title,
            pages,
        }
    }

    /// Index of the last page, 0 when the module is empty
    pub fn last_page_index(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }
}

/// Decode one page document; `None` for unknown page types
pub fn decode_page(doc: &PageDocument) -> Option<Page> {
    let page = match doc.kind.to_lowercase().as_str() {
        "theory" => Page::Theory {
            text: doc
                .text
                .clone()
                .or_else(|| doc.theory.clone())
                .unwrap_or_default(),
        },
        "test" => Page::Test {
            question: doc.question.clone().unwrap_or_default(),
            answers: doc.answers.clone().unwrap_or_default(),
            correct_answer_index: doc.correct_answer_index.unwrap_or(0),
            hint: doc.hint.clone(),
        },
        "coding" => Page::CodingTask {
            description: doc.description.clone().unwrap_or_default(),
            expected_code: doc.expected_code.clone().unwrap_or_default(),
            hint: doc.hint.clone(),
        },
        "final" => Page::Final {
            message: doc
                .message
                .clone()
                .unwrap_or_else(|| DEFAULT_FINAL_MESSAGE.to_string()),
        },
        _ => return None,
    };
    Some(page)
}

/// Source of course content
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Ordered module list of a course; empty when the course is unknown
    async fn load_course(&self, course: &CourseId) -> StorageResult<Vec<Module>>;
}

/// Catalog read from the document store, modules ordered by id
pub struct StoreCatalog {
    store: Arc<dyn DocumentStore>,
}

impl StoreCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CourseCatalog for StoreCatalog {
    async fn load_course(&self, course: &CourseId) -> StorageResult<Vec<Module>> {
        let mut modules: Vec<Module> = self
            .store
            .load_modules(course)
            .await?
            .into_iter()
            .map(Module::from_document)
            .collect();
        modules.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(modules)
    }
}

//! Storage abstraction layer
//!
//! A small document-store interface (user records, achievement
//! sub-records, course catalog) with version-checked writes, plus the
//! optimistic transaction loop every mutation of learner state goes
//! through.

pub mod backends;
pub mod config;
pub mod error;
pub mod factory;
pub mod lock;
pub mod traits;
pub mod transaction;
pub mod types;


pub use config::{BackendType, RetryPolicy, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use factory::StorageFactory;
pub use traits::DocumentStore;
pub use transaction::{run_transaction, run_user_transaction, TxDecision};
pub use types::{
    AchievementDocument, HealthStatus, ModuleDocument, PageDocument, UserDocument, UserId,
    UserSubscription, Version, Versioned, WriteBatch, WriteOp,
};

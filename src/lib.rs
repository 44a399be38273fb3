//! # Kvantor
//!
//! Progress, gamification and resource-economy core of a learning app:
//! lives, hints and coins under concurrent access, life regeneration over
//! time, per-course reading positions and idempotent achievement unlocks.
//!
//! ## Usage
//!
//! ```bash
//! kvantor bootstrap --user ada --nickname Ada
//! kvantor next --user ada --course python
//! kvantor answer --user ada --course python --choice 1
//! kvantor status --user ada
//! ```
//!
//! ## Modules
//!
//! - `storage` - Document store trait, memory and file backends, optimistic transactions
//! - `ledger` - Transactional spending and crediting of lives, hints and coins
//! - `regen` - Countdown policy and the periodic life regeneration loop
//! - `progress` - Per-course positions, clamped restore and page advancing
//! - `achievements` - Course completion checks and idempotent unlocks
//! - `evaluator` - Scoring of test answers and coding submissions
//! - `shop` - Buying lives and hints with coins
//! - `bootstrap` - Creating learner records and filling missing fields
//! - `session` - Service wiring and per-lesson orchestration
//! - `review` - Client for the external code-review assistant
//! - `events` - UI events for actions blocked by missing resources
pub mod achievements;
pub mod app;
pub mod bootstrap;
pub mod cli;
pub mod clock;
pub mod config;
pub mod course;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod ledger;
pub mod progress;
pub mod regen;
pub mod review;
pub mod session;
pub mod shop;
pub mod storage;
pub mod user;

pub use error::{Error, Result};

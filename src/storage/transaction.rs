//! Optimistic read-modify-write transactions
//!
//! A transaction reads a document and its version, lets the caller compute
//! the new value, and commits with a write conditional on the version read.
//! When another writer got there first the whole read-compute-write cycle is
//! retried with exponential backoff, up to the policy's retry budget. Nothing
//! is written when the caller aborts or when the retries run out.

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use super::config::RetryPolicy;
use super::error::{StorageError, StorageResult};
use super::traits::DocumentStore;
use super::types::{AchievementDocument, UserDocument, UserId, Version, Versioned};
use crate::achievements::AchievementId;

/// What the transaction body decided to do with the document it was given
#[derive(Debug)]
pub enum TxDecision<D, T> {
    /// Write `D` and return `T` once the write commits
    Commit(D, T),
    /// Leave the document untouched and return `T`
    Abort(T),
}

/// A single document that transactions can run against
#[async_trait]
pub trait TransactionTarget: Send + Sync {
    type Doc: Send + Sync;

    /// Human-readable name for logs and errors
    fn describe(&self) -> String;

    async fn read(&self) -> StorageResult<Versioned<Self::Doc>>;

    async fn write(&self, expected: Version, doc: Self::Doc) -> StorageResult<Version>;
}

/// The user record of one learner
pub struct UserTarget<'a> {
    store: &'a dyn DocumentStore,
    uid: &'a UserId,
}

impl<'a> UserTarget<'a> {
    pub fn new(store: &'a dyn DocumentStore, uid: &'a UserId) -> Self {
        Self { store, uid }
    }
}

#[async_trait]
impl TransactionTarget for UserTarget<'_> {
    type Doc = UserDocument;

    fn describe(&self) -> String {
        format!("users/{}", self.uid)
    }

    async fn read(&self) -> StorageResult<Versioned<UserDocument>> {
        self.store.read_user(self.uid).await
    }

    async fn write(&self, expected: Version, doc: UserDocument) -> StorageResult<Version> {
        self.store.write_user(self.uid, expected, doc).await
    }
}

/// One achievement sub-record of a learner
pub struct AchievementTarget<'a> {
    store: &'a dyn DocumentStore,
    uid: &'a UserId,
    id: &'a AchievementId,
}

impl<'a> AchievementTarget<'a> {
    pub fn new(store: &'a dyn DocumentStore, uid: &'a UserId, id: &'a AchievementId) -> Self {
        Self { store, uid, id }
    }
}

#[async_trait]
impl TransactionTarget for AchievementTarget<'_> {
    type Doc = AchievementDocument;

    fn describe(&self) -> String {
        format!("users/{}/achievements/{}", self.uid, self.id)
    }

    async fn read(&self) -> StorageResult<Versioned<AchievementDocument>> {
        self.store.read_achievement(self.uid, self.id).await
    }

    async fn write(&self, expected: Version, doc: AchievementDocument) -> StorageResult<Version> {
        self.store
            .write_achievement(self.uid, self.id, expected, doc)
            .await
    }
}

/// Run `body` as an optimistic transaction against `target`.
///
/// `body` may run several times and must not have side effects beyond
/// computing its decision.
pub async fn run_transaction<S, T, F>(target: &S, policy: &RetryPolicy, mut body: F) -> StorageResult<T>
where
    S: TransactionTarget + ?Sized,
    T: Send,
    F: FnMut(Option<S::Doc>) -> TxDecision<S::Doc, T> + Send,
{
    let mut attempt: u32 = 0;

    loop {
        let current = target.read().await?;

        let (doc, output) = match body(current.value) {
            TxDecision::Abort(output) => {
                trace!(target = %target.describe(), "transaction aborted without writing");
                return Ok(output);
            }
            TxDecision::Commit(doc, output) => (doc, output),
        };

        match target.write(current.version, doc).await {
            Ok(version) => {
                trace!(target = %target.describe(), version = version.0, attempt, "transaction committed");
                return Ok(output);
            }
            Err(e) if e.is_conflict() => {
                attempt += 1;
                if attempt > policy.max_retries {
                    warn!(target = %target.describe(), attempt, "transaction retries exhausted");
                    return Err(StorageError::transaction(format!(
                        "{} still conflicting after {} attempts",
                        target.describe(),
                        attempt
                    )));
                }

                let delay = policy.delay_for(attempt);
                debug!(target = %target.describe(), attempt, ?delay, "write conflict, retrying transaction");
                sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Run a transaction on a user record, treating a missing record as empty
pub async fn run_user_transaction<T, F>(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    uid: &UserId,
    mut body: F,
) -> StorageResult<T>
where
    T: Send,
    F: FnMut(UserDocument) -> TxDecision<UserDocument, T> + Send,
{
    let target = UserTarget::new(store, uid);
    run_transaction(&target, policy, |doc| body(doc.unwrap_or_default())).await
}

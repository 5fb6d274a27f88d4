use std::future::Future;

use thiserror::Error;

use hearth_core::{
    Account, AccountId, Category, CategoryAssignment, CategoryRule, PatternStatus, PipelineStats,
    RecurringPattern, Transaction,
};

/// Opaque storage failure. The backing store maps its own error type
/// into this at the boundary; the pipeline treats any occurrence as
/// run-fatal infrastructure trouble.
#[derive(Debug, Error)]
#[error("store error: {0}")]
pub struct StoreError(String);

impl StoreError {
    pub fn new(cause: impl std::fmt::Display) -> Self {
        StoreError(cause.to_string())
    }
}

/// Read/write access to the transaction table. The only write the
/// pipeline performs is the single-row category assignment.
pub trait TransactionRepository {
    fn accounts(&self) -> impl Future<Output = Result<Vec<Account>, StoreError>> + Send;

    /// Transactions with no category yet, optionally scoped to one account.
    fn uncategorized_transactions(
        &self,
        account: Option<AccountId>,
    ) -> impl Future<Output = Result<Vec<Transaction>, StoreError>> + Send;

    /// The full history, optionally scoped to one account.
    fn all_transactions(
        &self,
        account: Option<AccountId>,
    ) -> impl Future<Output = Result<Vec<Transaction>, StoreError>> + Send;

    fn assign_category(
        &self,
        assignment: &CategoryAssignment,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Read access to categories and user-defined rules.
pub trait CategoryRepository {
    fn categories(&self) -> impl Future<Output = Result<Vec<Category>, StoreError>> + Send;

    fn rules(&self) -> impl Future<Output = Result<Vec<CategoryRule>, StoreError>> + Send;
}

/// Append-only audit log of pipeline runs.
pub trait CategorizationLog {
    fn record_run(
        &self,
        stats: &PipelineStats,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Persistence for detected recurring patterns.
pub trait RecurringPatternRepository {
    fn patterns(&self) -> impl Future<Output = Result<Vec<RecurringPattern>, StoreError>> + Send;

    fn insert_pattern(
        &self,
        pattern: &RecurringPattern,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Replaces the stored pattern with the given one (matched by id).
    fn update_pattern(
        &self,
        pattern: &RecurringPattern,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn set_pattern_status(
        &self,
        id: i64,
        status: PatternStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

pub mod account;
pub mod category;
pub mod money;
pub mod recurring;
pub mod stats;
pub mod transaction;

pub use account::{Account, AccountId};
pub use category::{
    Category, CategoryId, CategoryRule, RuleMatchType, DEFAULT_CATEGORIES, TRANSFER_CATEGORY,
};
pub use money::Money;
pub use recurring::{Cadence, PatternStatus, RecurringPattern};
pub use stats::PipelineStats;
pub use transaction::{
    CategoryAssignment, CategorySource, Transaction, TransactionId, TransactionKind,
};

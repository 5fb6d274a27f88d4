pub mod bank;
pub mod classifier;
pub mod pipeline;
pub mod recurring;
pub mod repo;
pub mod rules;
#[cfg(test)]
pub(crate) mod testutil;
pub mod transfer;

pub use bank::{map_bank_category, parser_provides_categories};
pub use classifier::{Classification, Classifier, ClassifierError, HttpClassifier, MockClassifier};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError, RunOptions};
pub use recurring::{run_detection, DetectedPattern, DetectionOutcome, Detector, DetectorConfig};
pub use repo::{
    CategorizationLog, CategoryRepository, RecurringPatternRepository, StoreError,
    TransactionRepository,
};
pub use rules::RuleEngine;
pub use transfer::TransferMatcher;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::transaction::CategorySource;

/// Aggregate result of one pipeline run, persisted append-only as an
/// audit record once the run finishes (or fails).
///
/// Invariant: for a completed run the five per-source counts sum to
/// `total`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStats {
    pub run_id: Uuid,
    pub account_id: Option<AccountId>,
    pub total: u32,
    pub rule_matches: u32,
    pub bank_matches: u32,
    pub ai_matches: u32,
    pub transfer_matches: u32,
    pub unmatched: u32,
    pub duration_ms: u64,
    /// Estimated spend on AI classification calls during this run.
    /// Kept at full precision; single calls cost fractions of a cent.
    pub ai_cost: Decimal,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl PipelineStats {
    pub fn begin(account_id: Option<AccountId>) -> Self {
        PipelineStats {
            run_id: Uuid::new_v4(),
            account_id,
            total: 0,
            rule_matches: 0,
            bank_matches: 0,
            ai_matches: 0,
            transfer_matches: 0,
            unmatched: 0,
            duration_ms: 0,
            ai_cost: Decimal::ZERO,
            error: None,
            started_at: Utc::now(),
        }
    }

    /// Record the outcome for one processed transaction.
    pub fn count(&mut self, source: CategorySource) {
        match source {
            CategorySource::Rule => self.rule_matches += 1,
            CategorySource::Bank => self.bank_matches += 1,
            CategorySource::Ai => self.ai_matches += 1,
            CategorySource::Transfer => self.transfer_matches += 1,
            CategorySource::Unmatched => self.unmatched += 1,
            // Manual assignments are made outside the pipeline.
            CategorySource::Manual => {}
        }
    }

    pub fn matched(&self) -> u32 {
        self.rule_matches + self.bank_matches + self.ai_matches + self.transfer_matches
    }

    /// The per-source counts must account for every processed transaction.
    pub fn is_consistent(&self) -> bool {
        self.matched() + self.unmatched == self.total
    }
}

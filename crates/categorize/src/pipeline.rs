use std::collections::{HashMap, HashSet};
use std::time::Instant;

use thiserror::Error;

use hearth_core::{
    Account, AccountId, Category, CategoryAssignment, CategoryId, CategorySource, PipelineStats,
    Transaction, TransactionId, TRANSFER_CATEGORY,
};

use crate::bank;
use crate::classifier::Classifier;
use crate::repo::{CategorizationLog, CategoryRepository, StoreError, TransactionRepository};
use crate::rules::RuleEngine;
use crate::transfer::TransferMatcher;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

/// Tunables for one pipeline instance. The defaults are starting
/// points, not calibrated values; deployments override them through
/// server configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Days either side of a transaction to look for its transfer leg.
    pub transfer_window_days: i64,
    /// Currency-rounding slack when comparing transfer magnitudes.
    pub transfer_tolerance_cents: i64,
    /// Minimum classifier confidence to accept an AI category.
    pub ai_confidence_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            transfer_window_days: 3,
            transfer_tolerance_cents: 1,
            ai_confidence_threshold: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Restrict the run to one account; `None` means household-wide.
    pub account: Option<AccountId>,
    /// Re-pull already categorized transactions and overwrite their
    /// assignments. Manual assignments are left alone either way.
    pub reprocess: bool,
}

/// Loaded category set with case-insensitive name resolution.
struct Catalog {
    categories: Vec<Category>,
    by_name: HashMap<String, CategoryId>,
}

impl Catalog {
    fn new(categories: Vec<Category>) -> Self {
        let by_name = categories
            .iter()
            .filter_map(|c| c.id.map(|id| (c.name.to_lowercase(), id)))
            .collect();
        Self { categories, by_name }
    }

    fn resolve(&self, name: &str) -> Option<CategoryId> {
        self.by_name.get(&name.to_lowercase()).copied()
    }

    fn transfer(&self) -> Option<CategoryId> {
        self.resolve(TRANSFER_CATEGORY)
    }

    fn all(&self) -> &[Category] {
        &self.categories
    }
}

enum StageOutcome<'a> {
    Matched {
        source: CategorySource,
        category_id: CategoryId,
        peer: Option<&'a Transaction>,
    },
    Unmatched,
}

/// Runs the staged categorization over a batch of transactions:
/// rules, then bank hints, then transfer pairing, then the AI
/// fallback. The first hit wins and is written back immediately.
pub struct Pipeline<C> {
    classifier: C,
    config: PipelineConfig,
}

impl<C: Classifier> Pipeline<C> {
    pub fn new(classifier: C, config: PipelineConfig) -> Self {
        Self { classifier, config }
    }

    /// Execute one run and persist its stats row, whatever the outcome.
    /// A store failure mid-run still records the counts accumulated so
    /// far, with the error message attached, before propagating.
    pub async fn run<S>(&self, store: &S, options: &RunOptions) -> Result<PipelineStats, PipelineError>
    where
        S: TransactionRepository + CategoryRepository + CategorizationLog + Sync,
    {
        let clock = Instant::now();
        let mut stats = PipelineStats::begin(options.account);

        let outcome = self.run_batch(store, options, &mut stats).await;

        stats.duration_ms = clock.elapsed().as_millis() as u64;
        if let Err(error) = &outcome {
            stats.error = Some(error.to_string());
        }
        match store.record_run(&stats).await {
            Ok(()) => {}
            Err(log_error) if outcome.is_ok() => return Err(log_error.into()),
            Err(log_error) => {
                tracing::warn!(run = %stats.run_id, "could not persist stats for failed run: {log_error}");
            }
        }
        outcome?;

        tracing::info!(
            run = %stats.run_id,
            total = stats.total,
            matched = stats.matched(),
            unmatched = stats.unmatched,
            "categorization run complete"
        );
        Ok(stats)
    }

    async fn run_batch<S>(
        &self,
        store: &S,
        options: &RunOptions,
        stats: &mut PipelineStats,
    ) -> Result<(), PipelineError>
    where
        S: TransactionRepository + CategoryRepository + CategorizationLog + Sync,
    {
        let catalog = Catalog::new(store.categories().await?);
        let engine = RuleEngine::new(store.rules().await?);
        let accounts: HashMap<AccountId, Account> = store
            .accounts()
            .await?
            .into_iter()
            .filter_map(|a| a.id.map(|id| (id, a)))
            .collect();
        let matcher = TransferMatcher::new(
            self.config.transfer_window_days,
            self.config.transfer_tolerance_cents,
        );

        let mut batch = if options.reprocess {
            store.all_transactions(options.account).await?
        } else {
            store.uncategorized_transactions(options.account).await?
        };
        // User-made assignments are never overwritten.
        batch.retain(|tx| tx.category_source != Some(CategorySource::Manual));

        stats.total = batch.len() as u32;
        let mut assigned: HashSet<TransactionId> = HashSet::new();

        for tx in &batch {
            if assigned.contains(&tx.id) {
                continue;
            }
            match self
                .categorize_one(tx, &batch, &assigned, &engine, &matcher, &catalog, &accounts, stats)
                .await
            {
                StageOutcome::Matched { source, category_id, peer } => {
                    store
                        .assign_category(&CategoryAssignment {
                            transaction_id: tx.id,
                            category_id: Some(category_id),
                            source,
                            transfer_peer_id: peer.map(|p| p.id),
                        })
                        .await?;
                    stats.count(source);
                    assigned.insert(tx.id);

                    // The other leg of a transfer is assigned in the
                    // same step and skipped when its turn comes.
                    if let Some(peer) = peer {
                        store
                            .assign_category(&CategoryAssignment {
                                transaction_id: peer.id,
                                category_id: Some(category_id),
                                source: CategorySource::Transfer,
                                transfer_peer_id: Some(tx.id),
                            })
                            .await?;
                        stats.count(CategorySource::Transfer);
                        assigned.insert(peer.id);
                    }
                }
                StageOutcome::Unmatched => {
                    store
                        .assign_category(&CategoryAssignment {
                            transaction_id: tx.id,
                            category_id: None,
                            source: CategorySource::Unmatched,
                            transfer_peer_id: None,
                        })
                        .await?;
                    stats.count(CategorySource::Unmatched);
                    assigned.insert(tx.id);
                }
            }
        }

        debug_assert!(stats.is_consistent());
        Ok(())
    }

    /// Stages are attempted in fixed order; the first success ends the
    /// per-transaction state machine. Any stage failure is contained
    /// here: the transaction falls through to the next stage or to
    /// `Unmatched`, never aborting the batch.
    #[allow(clippy::too_many_arguments)]
    async fn categorize_one<'a>(
        &self,
        tx: &Transaction,
        batch: &'a [Transaction],
        assigned: &HashSet<TransactionId>,
        engine: &RuleEngine,
        matcher: &TransferMatcher,
        catalog: &Catalog,
        accounts: &HashMap<AccountId, Account>,
        stats: &mut PipelineStats,
    ) -> StageOutcome<'a> {
        if let Some(rule) = engine.find_match(tx) {
            return StageOutcome::Matched {
                source: CategorySource::Rule,
                category_id: rule.category_id,
                peer: None,
            };
        }

        if let (Some(parser), Some(hint)) = (tx.import_source.as_deref(), tx.bank_category.as_deref())
        {
            if bank::parser_provides_categories(parser) {
                if let Some(name) = bank::map_bank_category(parser, hint) {
                    match catalog.resolve(name) {
                        Some(category_id) => {
                            return StageOutcome::Matched {
                                source: CategorySource::Bank,
                                category_id,
                                peer: None,
                            }
                        }
                        None => tracing::warn!(
                            transaction = %tx.id,
                            category = name,
                            "bank mapping names an unknown category"
                        ),
                    }
                }
            }
        }

        let candidates = batch.iter().filter(|c| !assigned.contains(&c.id));
        if let Some(peer) = matcher.find_pair(tx, candidates, accounts) {
            match catalog.transfer() {
                Some(category_id) => {
                    return StageOutcome::Matched {
                        source: CategorySource::Transfer,
                        category_id,
                        peer: Some(peer),
                    }
                }
                None => tracing::warn!(
                    transaction = %tx.id,
                    "transfer category is not seeded; skipping transfer stage"
                ),
            }
        }

        if self.classifier.is_enabled() {
            match self.classifier.classify(&tx.description, catalog.all()).await {
                Ok(classification) => {
                    // The call cost is incurred whether or not we accept
                    // the answer.
                    stats.ai_cost += classification.estimated_cost;
                    if classification.confidence >= self.config.ai_confidence_threshold {
                        if let Some(category_id) = catalog.resolve(&classification.category) {
                            return StageOutcome::Matched {
                                source: CategorySource::Ai,
                                category_id,
                                peer: None,
                            };
                        }
                        tracing::warn!(
                            transaction = %tx.id,
                            category = %classification.category,
                            "classifier proposed an unknown category"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(transaction = %tx.id, "classification failed: {error}");
                }
            }
        }

        StageOutcome::Unmatched
    }
}

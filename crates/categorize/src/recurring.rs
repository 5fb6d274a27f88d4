use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use hearth_core::{
    Cadence, CategoryId, Money, PatternStatus, RecurringPattern, Transaction,
};

use crate::pipeline::PipelineError;
use crate::repo::{RecurringPatternRepository, TransactionRepository};

/// Thresholds for the recurring-payment detector. Defaults are
/// documented starting points; callers tune them as needed.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum transactions in a group before it can become a pattern.
    pub min_occurrences: usize,
    /// Amount tolerance as a fraction of the group's median magnitude.
    pub amount_tolerance_ratio: f64,
    /// Lower bound on the amount tolerance, in cents.
    pub amount_tolerance_floor_cents: i64,
    /// Fraction of amounts that must sit within the tolerance band.
    pub amount_stability_min: f64,
    /// Fraction of observed gaps that must sit within the cadence
    /// tolerance.
    pub cadence_fit_min: f64,
    /// Missed intervals before an existing pattern is marked inactive.
    pub inactive_after_intervals: i64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_occurrences: 3,
            amount_tolerance_ratio: 0.1,
            amount_tolerance_floor_cents: 100,
            amount_stability_min: 0.8,
            cadence_fit_min: 0.7,
            inactive_after_intervals: 3,
        }
    }
}

/// A group of historical transactions that recurs at a steady cadence
/// with a stable amount.
#[derive(Debug, Clone)]
pub struct DetectedPattern {
    pub signature: String,
    pub label: String,
    pub cadence: Cadence,
    pub expected_amount: Money,
    pub amount_min: Money,
    pub amount_max: Money,
    pub currency: String,
    pub category_id: Option<CategoryId>,
    pub occurrences: u32,
    pub first_seen: chrono::NaiveDate,
    pub last_seen: chrono::NaiveDate,
}

impl DetectedPattern {
    fn to_pattern(&self) -> RecurringPattern {
        RecurringPattern {
            id: None,
            signature: self.signature.clone(),
            label: self.label.clone(),
            cadence: self.cadence,
            expected_amount: self.expected_amount,
            amount_min: self.amount_min,
            amount_max: self.amount_max,
            currency: self.currency.clone(),
            category_id: self.category_id,
            status: PatternStatus::Active,
            occurrences: self.occurrences,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionOutcome {
    pub detected: u32,
    pub created: u32,
    pub updated: u32,
}

/// Clusters transaction history into recurring patterns. Pure over its
/// input; persistence happens in [`run_detection`].
#[derive(Debug, Clone, Default)]
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, transactions: &[Transaction]) -> Vec<DetectedPattern> {
        // BTreeMap keeps group iteration, and thus output order,
        // deterministic.
        let mut groups: BTreeMap<String, Vec<&Transaction>> = BTreeMap::new();
        for tx in transactions {
            let signature = normalize_signature(&tx.description);
            if signature.len() < 3 {
                continue;
            }
            let sign = if tx.amount.is_negative() { '-' } else { '+' };
            let key = format!("{signature}|{sign}|{}", tx.currency);
            groups.entry(key).or_default().push(tx);
        }

        let mut detections = Vec::new();
        for (key, mut group) in groups {
            if group.len() < self.config.min_occurrences {
                continue;
            }
            group.sort_by_key(|tx| (tx.date, tx.id.0));

            let Some(amounts) = self.amount_band(&group) else {
                continue;
            };
            let Some(cadence) = self.fit_cadence(&group) else {
                continue;
            };

            let first = group[0];
            let last = group[group.len() - 1];
            detections.push(DetectedPattern {
                signature: key,
                label: first.description.clone(),
                cadence,
                expected_amount: amounts.expected,
                amount_min: amounts.min,
                amount_max: amounts.max,
                currency: first.currency.clone(),
                category_id: majority_category(&group),
                occurrences: group.len() as u32,
                first_seen: first.date,
                last_seen: last.date,
            });
        }
        detections
    }

    /// Median-centered amount band; `None` when the group's amounts are
    /// too volatile to be one recurring payment.
    fn amount_band(&self, group: &[&Transaction]) -> Option<AmountBand> {
        let mut magnitudes: Vec<i64> = group.iter().map(|tx| tx.amount.abs().to_cents()).collect();
        magnitudes.sort_unstable();
        let median_magnitude = median(&magnitudes);
        let tolerance = ((median_magnitude as f64 * self.config.amount_tolerance_ratio) as i64)
            .max(self.config.amount_tolerance_floor_cents);

        let within = magnitudes
            .iter()
            .filter(|m| (**m - median_magnitude).abs() <= tolerance)
            .count();
        if (within as f64) < self.config.amount_stability_min * group.len() as f64 {
            return None;
        }

        let mut signed: Vec<i64> = group.iter().map(|tx| tx.amount.to_cents()).collect();
        signed.sort_unstable();
        Some(AmountBand {
            expected: Money::from_cents(median(&signed)),
            min: Money::from_cents(signed[0]),
            max: Money::from_cents(signed[signed.len() - 1]),
        })
    }

    /// The cadence whose expected interval is closest to the group's
    /// median gap, provided enough gaps actually land on it.
    fn fit_cadence(&self, group: &[&Transaction]) -> Option<Cadence> {
        let gaps: Vec<i64> = group
            .windows(2)
            .map(|pair| (pair[1].date - pair[0].date).num_days())
            .collect();
        if gaps.is_empty() {
            return None;
        }
        let mut sorted = gaps.clone();
        sorted.sort_unstable();
        let median_gap = median(&sorted);

        let cadence = Cadence::ALL
            .into_iter()
            .filter(|c| (median_gap - c.expected_interval_days()).abs() <= c.tolerance_days())
            .min_by_key(|c| (median_gap - c.expected_interval_days()).abs())?;

        let on_cadence = gaps
            .iter()
            .filter(|gap| (**gap - cadence.expected_interval_days()).abs() <= cadence.tolerance_days())
            .count();
        if (on_cadence as f64) < self.config.cadence_fit_min * gaps.len() as f64 {
            return None;
        }
        Some(cadence)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

struct AmountBand {
    expected: Money,
    min: Money,
    max: Money,
}

/// Lowercased alphabetic words only: dates, card masks and reference
/// numbers all drop out, so monthly charges from the same payee share a
/// signature.
fn normalize_signature(description: &str) -> String {
    description
        .to_lowercase()
        .split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Median of a sorted, non-empty slice.
fn median(sorted: &[i64]) -> i64 {
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}

/// The most common category among the group's already categorized
/// members; ties resolve to the lowest id.
fn majority_category(group: &[&Transaction]) -> Option<CategoryId> {
    let mut counts: HashMap<CategoryId, usize> = HashMap::new();
    for tx in group {
        if let Some(category) = tx.category_id {
            *counts.entry(category).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by_key(|(id, count)| (*count, std::cmp::Reverse(id.0)))
        .map(|(id, _)| id)
}

/// One detection run: cluster the full history, then reconcile with the
/// stored patterns. Matches are updated, the rest created, and patterns
/// that have gone quiet are retired.
pub async fn run_detection<S>(store: &S, detector: &Detector) -> Result<DetectionOutcome, PipelineError>
where
    S: TransactionRepository + RecurringPatternRepository + Sync,
{
    let transactions = store.all_transactions(None).await?;
    let detections = detector.detect(&transactions);
    let existing = store.patterns().await?;
    let by_signature: HashMap<&str, &RecurringPattern> = existing
        .iter()
        .map(|p| (p.signature.as_str(), p))
        .collect();

    let mut created = 0u32;
    let mut updated = 0u32;
    for detection in &detections {
        match by_signature.get(detection.signature.as_str()) {
            Some(current) => {
                let mut refreshed = detection.to_pattern();
                refreshed.id = current.id;
                refreshed.first_seen = refreshed.first_seen.min(current.first_seen);
                // A category chosen earlier survives a run where the
                // group's members are still uncategorized.
                refreshed.category_id = detection.category_id.or(current.category_id);
                store.update_pattern(&refreshed).await?;
                updated += 1;
            }
            None => {
                store.insert_pattern(&detection.to_pattern()).await?;
                created += 1;
            }
        }
    }

    // Retirement pass, measured against the newest transaction we have
    // rather than the wall clock, so replayed histories behave the same.
    if let Some(latest) = transactions.iter().map(|tx| tx.date).max() {
        for pattern in store.patterns().await? {
            if pattern.status != PatternStatus::Active {
                continue;
            }
            let window =
                pattern.cadence.expected_interval_days() * detector.config.inactive_after_intervals;
            if (latest - pattern.last_seen).num_days() > window {
                if let Some(id) = pattern.id {
                    tracing::info!(pattern = %pattern.signature, "marking stale pattern inactive");
                    store.set_pattern_status(id, PatternStatus::Inactive).await?;
                }
            }
        }
    }

    let outcome = DetectionOutcome {
        detected: detections.len() as u32,
        created,
        updated,
    };
    tracing::info!(
        detected = outcome.detected,
        created = outcome.created,
        updated = outcome.updated,
        "recurring detection complete"
    );
    Ok(outcome)
}

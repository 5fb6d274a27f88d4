use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::category::CategoryId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Cadence {
    pub const ALL: [Cadence; 5] = [
        Cadence::Weekly,
        Cadence::Biweekly,
        Cadence::Monthly,
        Cadence::Quarterly,
        Cadence::Yearly,
    ];

    pub fn expected_interval_days(self) -> i64 {
        match self {
            Cadence::Weekly => 7,
            Cadence::Biweekly => 14,
            Cadence::Monthly => 30,
            Cadence::Quarterly => 91,
            Cadence::Yearly => 365,
        }
    }

    /// How far an observed interval may drift from the expected one and
    /// still count as on-cadence.
    pub fn tolerance_days(self) -> i64 {
        match self {
            Cadence::Weekly => 2,
            Cadence::Biweekly => 3,
            Cadence::Monthly => 5,
            Cadence::Quarterly => 10,
            Cadence::Yearly => 20,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Cadence::Weekly => "weekly",
            Cadence::Biweekly => "biweekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::Yearly => "yearly",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "weekly" => Some(Cadence::Weekly),
            "biweekly" => Some(Cadence::Biweekly),
            "monthly" => Some(Cadence::Monthly),
            "quarterly" => Some(Cadence::Quarterly),
            "yearly" => Some(Cadence::Yearly),
            _ => None,
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternStatus {
    Active,
    Inactive,
}

impl PatternStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatternStatus::Active => "active",
            PatternStatus::Inactive => "inactive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PatternStatus::Active),
            "inactive" => Some(PatternStatus::Inactive),
            _ => None,
        }
    }
}

/// A detected cluster of transactions sharing payee signature, amount
/// band and cadence. Created and updated by the detector only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringPattern {
    pub id: Option<i64>,
    /// Normalized payee signature the cluster is keyed on.
    pub signature: String,
    /// A representative raw description, for display.
    pub label: String,
    pub cadence: Cadence,
    pub expected_amount: Money,
    pub amount_min: Money,
    pub amount_max: Money,
    pub currency: String,
    pub category_id: Option<CategoryId>,
    pub status: PatternStatus,
    pub occurrences: u32,
    pub first_seen: NaiveDate,
    pub last_seen: NaiveDate,
}

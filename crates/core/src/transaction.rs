use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::account::AccountId;
use super::category::CategoryId;
use super::money::Money;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub i64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Income => "income",
            TransactionKind::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(TransactionKind::Income),
            "expense" => Some(TransactionKind::Expense),
            _ => None,
        }
    }
}

/// Which pipeline stage produced a category assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorySource {
    Rule,
    Bank,
    Ai,
    Transfer,
    Manual,
    Unmatched,
}

impl CategorySource {
    pub fn as_str(self) -> &'static str {
        match self {
            CategorySource::Rule => "rule",
            CategorySource::Bank => "bank",
            CategorySource::Ai => "ai",
            CategorySource::Transfer => "transfer",
            CategorySource::Manual => "manual",
            CategorySource::Unmatched => "unmatched",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rule" => Some(CategorySource::Rule),
            "bank" => Some(CategorySource::Bank),
            "ai" => Some(CategorySource::Ai),
            "transfer" => Some(CategorySource::Transfer),
            "manual" => Some(CategorySource::Manual),
            "unmatched" => Some(CategorySource::Unmatched),
            _ => None,
        }
    }
}

/// One bank movement. Created by import ingestion; the categorization
/// pipeline only ever touches the category fields, in a single write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub currency: String,
    pub kind: TransactionKind,
    pub category_id: Option<CategoryId>,
    pub category_source: Option<CategorySource>,
    pub transfer_peer_id: Option<TransactionId>,
    /// Category label supplied by the bank, when the importing
    /// connector provides one.
    pub bank_category: Option<String>,
    /// Parser key of the importing connector (e.g. "boursorama").
    pub import_source: Option<String>,
}

impl Transaction {
    pub fn is_outgoing(&self) -> bool {
        self.amount.is_negative()
    }

    pub fn is_incoming(&self) -> bool {
        self.amount.is_positive()
    }
}

/// The single-row write the pipeline performs per categorized
/// transaction. Exactly one active assignment exists per transaction;
/// the source always records the stage that produced the latest value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub transaction_id: TransactionId,
    pub category_id: Option<CategoryId>,
    pub source: CategorySource,
    pub transfer_peer_id: Option<TransactionId>,
}

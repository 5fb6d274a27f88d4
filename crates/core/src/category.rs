use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::account::AccountId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId(pub i64);

impl fmt::Display for CategoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named spending bucket. Read-only from the pipeline's perspective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: Option<CategoryId>,
    pub name: String,
    pub parent_id: Option<CategoryId>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl Category {
    pub fn new(name: &str) -> Self {
        Category {
            id: None,
            name: name.to_string(),
            parent_id: None,
            icon: None,
            color: None,
        }
    }
}

/// Name of the reserved category both sides of a transfer pair are
/// assigned to. Seeded with the defaults; looked up by name at run time.
pub const TRANSFER_CATEGORY: &str = "Transfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleMatchType {
    #[default]
    Contains,
    Regex,
}

impl RuleMatchType {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleMatchType::Contains => "contains",
            RuleMatchType::Regex => "regex",
        }
    }
}

impl FromStr for RuleMatchType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(RuleMatchType::Contains),
            "regex" => Ok(RuleMatchType::Regex),
            other => Err(format!("Unknown match type: '{other}'")),
        }
    }
}

/// A user-defined matching rule. Rules are evaluated in
/// `(priority desc, created_at asc, id asc)` order; first match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRule {
    pub id: Option<i64>,
    pub pattern: String,
    pub match_type: RuleMatchType,
    pub category_id: CategoryId,
    pub priority: i32,
    /// Restricts the rule to one account when set.
    pub account_id: Option<AccountId>,
    pub created_at: DateTime<Utc>,
}

/// Categories seeded into a fresh store: `(name, parent, icon, color)`.
/// An empty parent means top-level.
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    ("Housing", "", "home", "#8d6e63"),
    ("Rent", "Housing", "key", "#8d6e63"),
    ("Utilities", "", "bolt", "#ffa000"),
    ("Groceries", "", "cart", "#43a047"),
    ("Restaurants", "", "utensils", "#ef6c00"),
    ("Transport", "", "bus", "#1e88e5"),
    ("Health", "", "heart", "#e53935"),
    ("Leisure", "", "ticket", "#8e24aa"),
    ("Shopping", "", "bag", "#d81b60"),
    ("Subscriptions", "", "repeat", "#3949ab"),
    ("Travel", "", "plane", "#00897b"),
    ("Education", "", "book", "#5e35b1"),
    ("Salary", "", "wallet", "#2e7d32"),
    ("Investments", "", "chart", "#00695c"),
    (TRANSFER_CATEGORY, "", "swap", "#607d8b"),
    ("Other", "", "dots", "#757575"),
];

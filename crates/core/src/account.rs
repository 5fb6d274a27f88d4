use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(pub i64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bank account tracked by the household. `owner` is the household
/// member the account belongs to; `None` means it is shared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Option<AccountId>,
    pub name: String,
    pub owner: Option<String>,
    pub currency: String,
}

impl Account {
    pub fn new(name: &str, currency: &str) -> Self {
        Account {
            id: None,
            name: name.to_string(),
            owner: None,
            currency: currency.to_string(),
        }
    }

    /// Two accounts are in the same ownership scope when they belong to
    /// the same member, or when either side is shared.
    pub fn same_scope(&self, other: &Account) -> bool {
        match (&self.owner, &other.owner) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

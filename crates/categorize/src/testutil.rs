//! In-memory repository doubles shared by the engine tests.

use std::sync::Mutex;

use chrono::NaiveDate;

use hearth_core::{
    Account, AccountId, Category, CategoryAssignment, CategoryId, CategoryRule, Money,
    PatternStatus, PipelineStats, RecurringPattern, Transaction, TransactionId, TransactionKind,
    DEFAULT_CATEGORIES,
};

use crate::repo::{
    CategorizationLog, CategoryRepository, RecurringPatternRepository, StoreError,
    TransactionRepository,
};

pub(crate) struct MemStore {
    pub accounts: Vec<Account>,
    pub categories: Vec<Category>,
    pub rules: Vec<CategoryRule>,
    pub transactions: Mutex<Vec<Transaction>>,
    pub patterns: Mutex<Vec<RecurringPattern>>,
    pub runs: Mutex<Vec<PipelineStats>>,
    pub fail_assignments: bool,
}

impl MemStore {
    pub fn new() -> Self {
        let categories = DEFAULT_CATEGORIES
            .iter()
            .enumerate()
            .map(|(i, (name, _, _, _))| Category {
                id: Some(CategoryId(i as i64 + 1)),
                name: name.to_string(),
                parent_id: None,
                icon: None,
                color: None,
            })
            .collect();
        MemStore {
            accounts: Vec::new(),
            categories,
            rules: Vec::new(),
            transactions: Mutex::new(Vec::new()),
            patterns: Mutex::new(Vec::new()),
            runs: Mutex::new(Vec::new()),
            fail_assignments: false,
        }
    }

    pub fn category_id(&self, name: &str) -> CategoryId {
        self.categories
            .iter()
            .find(|c| c.name == name)
            .and_then(|c| c.id)
            .unwrap()
    }

    pub fn transaction(&self, id: i64) -> Transaction {
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == TransactionId(id))
            .cloned()
            .unwrap()
    }
}

impl TransactionRepository for MemStore {
    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        Ok(self.accounts.clone())
    }

    async fn uncategorized_transactions(
        &self,
        account: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.category_id.is_none())
            .filter(|t| account.is_none_or(|a| t.account_id == a))
            .cloned()
            .collect())
    }

    async fn all_transactions(
        &self,
        account: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| account.is_none_or(|a| t.account_id == a))
            .cloned()
            .collect())
    }

    async fn assign_category(&self, assignment: &CategoryAssignment) -> Result<(), StoreError> {
        if self.fail_assignments {
            return Err(StoreError::new("write refused"));
        }
        let mut transactions = self.transactions.lock().unwrap();
        let tx = transactions
            .iter_mut()
            .find(|t| t.id == assignment.transaction_id)
            .ok_or_else(|| StoreError::new("no such transaction"))?;
        tx.category_id = assignment.category_id;
        tx.category_source = Some(assignment.source);
        tx.transfer_peer_id = assignment.transfer_peer_id;
        Ok(())
    }
}

impl CategoryRepository for MemStore {
    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.categories.clone())
    }

    async fn rules(&self) -> Result<Vec<CategoryRule>, StoreError> {
        Ok(self.rules.clone())
    }
}

impl CategorizationLog for MemStore {
    async fn record_run(&self, stats: &PipelineStats) -> Result<(), StoreError> {
        self.runs.lock().unwrap().push(stats.clone());
        Ok(())
    }
}

impl RecurringPatternRepository for MemStore {
    async fn patterns(&self) -> Result<Vec<RecurringPattern>, StoreError> {
        Ok(self.patterns.lock().unwrap().clone())
    }

    async fn insert_pattern(&self, pattern: &RecurringPattern) -> Result<i64, StoreError> {
        let mut patterns = self.patterns.lock().unwrap();
        let id = patterns.len() as i64 + 1;
        let mut stored = pattern.clone();
        stored.id = Some(id);
        patterns.push(stored);
        Ok(id)
    }

    async fn update_pattern(&self, pattern: &RecurringPattern) -> Result<(), StoreError> {
        let mut patterns = self.patterns.lock().unwrap();
        let slot = patterns
            .iter_mut()
            .find(|p| p.id == pattern.id)
            .ok_or_else(|| StoreError::new("no such pattern"))?;
        *slot = pattern.clone();
        Ok(())
    }

    async fn set_pattern_status(&self, id: i64, status: PatternStatus) -> Result<(), StoreError> {
        let mut patterns = self.patterns.lock().unwrap();
        let slot = patterns
            .iter_mut()
            .find(|p| p.id == Some(id))
            .ok_or_else(|| StoreError::new("no such pattern"))?;
        slot.status = status;
        Ok(())
    }
}

pub(crate) fn tx(id: i64, account: i64, date: (i32, u32, u32), cents: i64, desc: &str) -> Transaction {
    Transaction {
        id: TransactionId(id),
        account_id: AccountId(account),
        date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
        description: desc.to_string(),
        amount: Money::from_cents(cents),
        currency: "EUR".to_string(),
        kind: if cents < 0 { TransactionKind::Expense } else { TransactionKind::Income },
        category_id: None,
        category_source: None,
        transfer_peer_id: None,
        bank_category: None,
        import_source: None,
    }
}

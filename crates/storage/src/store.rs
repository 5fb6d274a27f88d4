use chrono::NaiveDate;

use hearth_categorize::{
    CategorizationLog, CategoryRepository, RecurringPatternRepository, StoreError,
    TransactionRepository,
};
use hearth_core::{
    Account, AccountId, Cadence, Category, CategoryAssignment, CategoryId, CategoryRule,
    CategorySource, Money, PatternStatus, PipelineStats, RecurringPattern, Transaction,
    TransactionId, TransactionKind,
};

use crate::db::DbPool;

/// Input record for transaction ingestion. Built by the importing
/// connectors; the categorization pipeline never creates transactions.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub account_id: AccountId,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    pub currency: String,
    pub kind: TransactionKind,
    pub bank_category: Option<String>,
    pub import_source: Option<String>,
}

/// SQLite-backed implementation of the repository interfaces the
/// categorization engine consumes.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

const TX_COLUMNS: &str = "id, account_id, date, description, amount_cents, currency, kind, \
     category_id, category_source, transfer_peer_id, bank_category, import_source";

type TransactionRow = (
    i64,            // id
    i64,            // account_id
    String,         // date
    String,         // description
    i64,            // amount_cents
    String,         // currency
    String,         // kind
    Option<i64>,    // category_id
    Option<String>, // category_source
    Option<i64>,    // transfer_peer_id
    Option<String>, // bank_category
    Option<String>, // import_source
);

fn row_to_transaction(row: TransactionRow) -> Result<Transaction, StoreError> {
    let date = NaiveDate::parse_from_str(&row.2, "%Y-%m-%d").map_err(StoreError::new)?;
    Ok(Transaction {
        id: TransactionId(row.0),
        account_id: AccountId(row.1),
        date,
        description: row.3,
        amount: Money::from_cents(row.4),
        currency: row.5,
        kind: TransactionKind::parse(&row.6).unwrap_or(TransactionKind::Expense),
        category_id: row.7.map(CategoryId),
        category_source: row.8.as_deref().and_then(CategorySource::parse),
        transfer_peer_id: row.9.map(TransactionId),
        bank_category: row.10,
        import_source: row.11,
    })
}

type PatternRow = (
    i64,            // id
    String,         // signature
    String,         // label
    String,         // cadence
    i64,            // expected_amount_cents
    i64,            // amount_min_cents
    i64,            // amount_max_cents
    String,         // currency
    Option<i64>,    // category_id
    String,         // status
    i64,            // occurrences
    String,         // first_seen
    String,         // last_seen
);

fn row_to_pattern(row: PatternRow) -> Result<RecurringPattern, StoreError> {
    Ok(RecurringPattern {
        id: Some(row.0),
        signature: row.1,
        label: row.2,
        cadence: Cadence::parse(&row.3)
            .ok_or_else(|| StoreError::new(format!("unknown cadence: {}", row.3)))?,
        expected_amount: Money::from_cents(row.4),
        amount_min: Money::from_cents(row.5),
        amount_max: Money::from_cents(row.6),
        currency: row.7,
        category_id: row.8.map(CategoryId),
        status: PatternStatus::parse(&row.9).unwrap_or(PatternStatus::Active),
        occurrences: row.10 as u32,
        first_seen: NaiveDate::parse_from_str(&row.11, "%Y-%m-%d").map_err(StoreError::new)?,
        last_seen: NaiveDate::parse_from_str(&row.12, "%Y-%m-%d").map_err(StoreError::new)?,
    })
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn insert_account(&self, account: &Account) -> Result<AccountId, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO accounts (name, owner, currency) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(&account.name)
        .bind(&account.owner)
        .bind(&account.currency)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(AccountId(row.0))
    }

    pub async fn insert_rule(&self, rule: &CategoryRule) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO category_rules (pattern, match_type, category_id, priority, account_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&rule.pattern)
        .bind(rule.match_type.as_str())
        .bind(rule.category_id.0)
        .bind(rule.priority)
        .bind(rule.account_id.map(|a| a.0))
        .bind(rule.created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(row.0)
    }

    pub async fn insert_transaction(&self, new: &NewTransaction) -> Result<TransactionId, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO transactions (account_id, date, description, amount_cents, currency, kind, bank_category, import_source) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(new.account_id.0)
        .bind(new.date.to_string())
        .bind(&new.description)
        .bind(new.amount.to_cents())
        .bind(&new.currency)
        .bind(new.kind.as_str())
        .bind(&new.bank_category)
        .bind(&new.import_source)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(TransactionId(row.0))
    }
}

impl TransactionRepository for SqliteStore {
    async fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, Option<String>, String)>(
            "SELECT id, name, owner, currency FROM accounts ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::new)?;

        Ok(rows
            .into_iter()
            .map(|r| Account {
                id: Some(AccountId(r.0)),
                name: r.1,
                owner: r.2,
                currency: r.3,
            })
            .collect())
    }

    async fn uncategorized_transactions(
        &self,
        account: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = match account {
            Some(account) => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {TX_COLUMNS} FROM transactions WHERE category_id IS NULL AND account_id = ? ORDER BY date, id"
                ))
                .bind(account.0)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {TX_COLUMNS} FROM transactions WHERE category_id IS NULL ORDER BY date, id"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::new)?;

        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn all_transactions(
        &self,
        account: Option<AccountId>,
    ) -> Result<Vec<Transaction>, StoreError> {
        let rows = match account {
            Some(account) => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {TX_COLUMNS} FROM transactions WHERE account_id = ? ORDER BY date, id"
                ))
                .bind(account.0)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {TX_COLUMNS} FROM transactions ORDER BY date, id"
                ))
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::new)?;

        rows.into_iter().map(row_to_transaction).collect()
    }

    async fn assign_category(&self, assignment: &CategoryAssignment) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE transactions SET category_id = ?, category_source = ?, transfer_peer_id = ?, \
             categorized_at = datetime('now') WHERE id = ?",
        )
        .bind(assignment.category_id.map(|c| c.0))
        .bind(assignment.source.as_str())
        .bind(assignment.transfer_peer_id.map(|t| t.0))
        .bind(assignment.transaction_id.0)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::new(format!(
                "no such transaction: {}",
                assignment.transaction_id
            )));
        }
        Ok(())
    }
}

impl CategoryRepository for SqliteStore {
    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, Option<i64>, Option<String>, Option<String>)>(
            "SELECT id, name, parent_id, icon, color FROM categories ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::new)?;

        Ok(rows
            .into_iter()
            .map(|r| Category {
                id: Some(CategoryId(r.0)),
                name: r.1,
                parent_id: r.2.map(CategoryId),
                icon: r.3,
                color: r.4,
            })
            .collect())
    }

    async fn rules(&self) -> Result<Vec<CategoryRule>, StoreError> {
        let rows = sqlx::query_as::<_, (i64, String, String, i64, i32, Option<i64>, String)>(
            "SELECT id, pattern, match_type, category_id, priority, account_id, created_at \
             FROM category_rules ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::new)?;

        rows.into_iter()
            .map(|r| {
                let created_at = chrono::DateTime::parse_from_rfc3339(&r.6)
                    .map_err(StoreError::new)?
                    .with_timezone(&chrono::Utc);
                Ok(CategoryRule {
                    id: Some(r.0),
                    pattern: r.1,
                    match_type: r.2.parse().unwrap_or_default(),
                    category_id: CategoryId(r.3),
                    priority: r.4,
                    account_id: r.5.map(AccountId),
                    created_at,
                })
            })
            .collect()
    }
}

impl CategorizationLog for SqliteStore {
    async fn record_run(&self, stats: &PipelineStats) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO categorization_runs \
             (run_id, account_id, total, rule_matches, bank_matches, ai_matches, transfer_matches, \
              unmatched, duration_ms, ai_cost, error, started_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(stats.run_id.to_string())
        .bind(stats.account_id.map(|a| a.0))
        .bind(i64::from(stats.total))
        .bind(i64::from(stats.rule_matches))
        .bind(i64::from(stats.bank_matches))
        .bind(i64::from(stats.ai_matches))
        .bind(i64::from(stats.transfer_matches))
        .bind(i64::from(stats.unmatched))
        .bind(stats.duration_ms as i64)
        .bind(stats.ai_cost.to_string())
        .bind(&stats.error)
        .bind(stats.started_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(())
    }
}

impl RecurringPatternRepository for SqliteStore {
    async fn patterns(&self) -> Result<Vec<RecurringPattern>, StoreError> {
        let rows = sqlx::query_as::<_, PatternRow>(
            "SELECT id, signature, label, cadence, expected_amount_cents, amount_min_cents, \
             amount_max_cents, currency, category_id, status, occurrences, first_seen, last_seen \
             FROM recurring_patterns ORDER BY signature",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::new)?;

        rows.into_iter().map(row_to_pattern).collect()
    }

    async fn insert_pattern(&self, pattern: &RecurringPattern) -> Result<i64, StoreError> {
        let row = sqlx::query_as::<_, (i64,)>(
            "INSERT INTO recurring_patterns \
             (signature, label, cadence, expected_amount_cents, amount_min_cents, amount_max_cents, \
              currency, category_id, status, occurrences, first_seen, last_seen) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&pattern.signature)
        .bind(&pattern.label)
        .bind(pattern.cadence.as_str())
        .bind(pattern.expected_amount.to_cents())
        .bind(pattern.amount_min.to_cents())
        .bind(pattern.amount_max.to_cents())
        .bind(&pattern.currency)
        .bind(pattern.category_id.map(|c| c.0))
        .bind(pattern.status.as_str())
        .bind(i64::from(pattern.occurrences))
        .bind(pattern.first_seen.to_string())
        .bind(pattern.last_seen.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(row.0)
    }

    async fn update_pattern(&self, pattern: &RecurringPattern) -> Result<(), StoreError> {
        let id = pattern
            .id
            .ok_or_else(|| StoreError::new("cannot update a pattern without an id"))?;
        let result = sqlx::query(
            "UPDATE recurring_patterns SET label = ?, cadence = ?, expected_amount_cents = ?, \
             amount_min_cents = ?, amount_max_cents = ?, currency = ?, category_id = ?, status = ?, \
             occurrences = ?, first_seen = ?, last_seen = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(&pattern.label)
        .bind(pattern.cadence.as_str())
        .bind(pattern.expected_amount.to_cents())
        .bind(pattern.amount_min.to_cents())
        .bind(pattern.amount_max.to_cents())
        .bind(&pattern.currency)
        .bind(pattern.category_id.map(|c| c.0))
        .bind(pattern.status.as_str())
        .bind(i64::from(pattern.occurrences))
        .bind(pattern.first_seen.to_string())
        .bind(pattern.last_seen.to_string())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::new(format!("no such pattern: {id}")));
        }
        Ok(())
    }

    async fn set_pattern_status(&self, id: i64, status: PatternStatus) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE recurring_patterns SET status = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::new)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_db, seed_default_categories};
    use chrono::Utc;
    use hearth_core::{RuleMatchType, TRANSFER_CATEGORY};

    async fn test_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let pool = create_db(&dir.path().join("hearth.db")).await.unwrap();
        seed_default_categories(&pool).await.unwrap();
        (dir, SqliteStore::new(pool))
    }

    fn new_tx(account: AccountId, date: (i32, u32, u32), cents: i64, desc: &str) -> NewTransaction {
        NewTransaction {
            account_id: account,
            date: NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap(),
            description: desc.to_string(),
            amount: Money::from_cents(cents),
            currency: "EUR".to_string(),
            kind: if cents < 0 { TransactionKind::Expense } else { TransactionKind::Income },
            bank_category: None,
            import_source: None,
        }
    }

    #[tokio::test]
    async fn seeding_creates_the_default_catalog() {
        let (_dir, store) = test_store().await;
        let categories = store.categories().await.unwrap();
        assert!(categories.iter().any(|c| c.name == TRANSFER_CATEGORY));
        let rent = categories.iter().find(|c| c.name == "Rent").unwrap();
        let housing = categories.iter().find(|c| c.name == "Housing").unwrap();
        assert_eq!(rent.parent_id, housing.id);
    }

    #[tokio::test]
    async fn seeding_twice_does_not_duplicate() {
        let (_dir, store) = test_store().await;
        seed_default_categories(store.pool()).await.unwrap();
        let categories = store.categories().await.unwrap();
        let transfers = categories.iter().filter(|c| c.name == TRANSFER_CATEGORY).count();
        assert_eq!(transfers, 1);
    }

    #[tokio::test]
    async fn assignment_moves_a_transaction_out_of_the_backlog() {
        let (_dir, store) = test_store().await;
        let account = store.insert_account(&Account::new("Checking", "EUR")).await.unwrap();
        let id = store
            .insert_transaction(&new_tx(account, (2024, 3, 5), -1349, "NETFLIX.COM PARIS"))
            .await
            .unwrap();

        assert_eq!(store.uncategorized_transactions(None).await.unwrap().len(), 1);

        let category = store
            .categories()
            .await
            .unwrap()
            .into_iter()
            .find(|c| c.name == "Subscriptions")
            .unwrap();
        store
            .assign_category(&CategoryAssignment {
                transaction_id: id,
                category_id: category.id,
                source: CategorySource::Rule,
                transfer_peer_id: None,
            })
            .await
            .unwrap();

        assert!(store.uncategorized_transactions(None).await.unwrap().is_empty());
        let all = store.all_transactions(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].category_id, category.id);
        assert_eq!(all[0].category_source, Some(CategorySource::Rule));
    }

    #[tokio::test]
    async fn assigning_a_missing_transaction_is_an_error() {
        let (_dir, store) = test_store().await;
        let result = store
            .assign_category(&CategoryAssignment {
                transaction_id: TransactionId(999),
                category_id: None,
                source: CategorySource::Unmatched,
                transfer_peer_id: None,
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn account_scope_filters_reads() {
        let (_dir, store) = test_store().await;
        let checking = store.insert_account(&Account::new("Checking", "EUR")).await.unwrap();
        let savings = store.insert_account(&Account::new("Savings", "EUR")).await.unwrap();
        store.insert_transaction(&new_tx(checking, (2024, 3, 1), -500, "A")).await.unwrap();
        store.insert_transaction(&new_tx(savings, (2024, 3, 1), -500, "B")).await.unwrap();

        let scoped = store.uncategorized_transactions(Some(checking)).await.unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].account_id, checking);
    }

    #[tokio::test]
    async fn rules_round_trip() {
        let (_dir, store) = test_store().await;
        let category = store.categories().await.unwrap()[0].clone();
        store
            .insert_rule(&CategoryRule {
                id: None,
                pattern: "NETFLIX".to_string(),
                match_type: RuleMatchType::Contains,
                category_id: category.id.unwrap(),
                priority: 10,
                account_id: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let rules = store.rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, "NETFLIX");
        assert_eq!(rules[0].match_type, RuleMatchType::Contains);
        assert_eq!(rules[0].priority, 10);
    }

    #[tokio::test]
    async fn run_log_is_append_only_storage() {
        let (_dir, store) = test_store().await;
        let mut stats = PipelineStats::begin(None);
        stats.total = 3;
        stats.rule_matches = 2;
        stats.unmatched = 1;
        store.record_run(&stats).await.unwrap();

        let (count, total): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total), 0) FROM categorization_runs",
        )
        .fetch_one(store.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(total, 3);
    }

    #[tokio::test]
    async fn patterns_round_trip_and_status_change() {
        let (_dir, store) = test_store().await;
        let pattern = RecurringPattern {
            id: None,
            signature: "gym membership|-|EUR".to_string(),
            label: "GYM MEMBERSHIP".to_string(),
            cadence: Cadence::Monthly,
            expected_amount: Money::from_cents(-4500),
            amount_min: Money::from_cents(-4500),
            amount_max: Money::from_cents(-4500),
            currency: "EUR".to_string(),
            category_id: None,
            status: PatternStatus::Active,
            occurrences: 5,
            first_seen: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            last_seen: NaiveDate::from_ymd_opt(2024, 5, 6).unwrap(),
        };
        let id = store.insert_pattern(&pattern).await.unwrap();

        let stored = store.patterns().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].cadence, Cadence::Monthly);
        assert_eq!(stored[0].expected_amount, Money::from_cents(-4500));
        assert_eq!(stored[0].occurrences, 5);

        store.set_pattern_status(id, PatternStatus::Inactive).await.unwrap();
        assert_eq!(store.patterns().await.unwrap()[0].status, PatternStatus::Inactive);

        let mut updated = stored[0].clone();
        updated.occurrences = 6;
        updated.status = PatternStatus::Active;
        store.update_pattern(&updated).await.unwrap();
        let refreshed = store.patterns().await.unwrap();
        assert_eq!(refreshed[0].occurrences, 6);
        assert_eq!(refreshed[0].status, PatternStatus::Active);
    }
}

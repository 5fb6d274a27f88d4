//! Static mapping of bank-provided category labels to internal
//! category names, keyed by the parser that imported the transaction.
//! Only some connectors supply category data; the orchestrator probes
//! with [`parser_provides_categories`] before attempting a lookup.

/// Per-parser mapping tables: `(parser key, [(bank label, category name)])`.
/// Bank labels are stored pre-normalized (lowercase, single spaces).
const BANK_CATEGORY_TABLES: &[(&str, &[(&str, &str)])] = &[
    (
        "boursorama",
        &[
            ("alimentation", "Groceries"),
            ("restaurants, bars", "Restaurants"),
            ("transports", "Transport"),
            ("abonnements", "Subscriptions"),
            ("loyer", "Rent"),
            ("energie, eau", "Utilities"),
            ("sante", "Health"),
            ("loisirs", "Leisure"),
            ("shopping", "Shopping"),
            ("voyages", "Travel"),
            ("salaires", "Salary"),
            ("virements internes", "Transfer"),
        ],
    ),
    (
        "powens",
        &[
            ("food & groceries", "Groceries"),
            ("eating out", "Restaurants"),
            ("transportation", "Transport"),
            ("subscriptions & memberships", "Subscriptions"),
            ("rent & housing", "Rent"),
            ("gas & electricity", "Utilities"),
            ("health & wellness", "Health"),
            ("entertainment", "Leisure"),
            ("shopping", "Shopping"),
            ("travel", "Travel"),
            ("income & salary", "Salary"),
            ("internal transfer", "Transfer"),
        ],
    ),
];

fn table_for(parser_key: &str) -> Option<&'static [(&'static str, &'static str)]> {
    let key = parser_key.trim().to_lowercase();
    BANK_CATEGORY_TABLES
        .iter()
        .find(|(parser, _)| *parser == key)
        .map(|(_, table)| *table)
}

/// Whether the given connector ships category labels at all. Lets the
/// orchestrator skip the bank stage without a lookup.
pub fn parser_provides_categories(parser_key: &str) -> bool {
    table_for(parser_key).is_some()
}

/// Exact-match lookup of a bank label, case- and whitespace-normalized.
/// Returns the internal category name, to be resolved against the
/// loaded catalog by the caller.
pub fn map_bank_category(parser_key: &str, hint: &str) -> Option<&'static str> {
    let table = table_for(parser_key)?;
    let normalized = normalize(hint);
    table
        .iter()
        .find(|(label, _)| *label == normalized)
        .map(|(_, category)| *category)
}

fn normalize(label: &str) -> String {
    label
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

use hearth_core::{CategoryRule, RuleMatchType, Transaction};

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: CategoryRule,
    compiled_regex: Option<regex::Regex>,
}

/// Evaluates user-defined category rules against transactions.
///
/// Rules are held in `(priority desc, created_at asc, id asc)` order so
/// evaluation is deterministic; the first matching rule wins.
pub struct RuleEngine {
    rules: Vec<CompiledRule>,
}

impl RuleEngine {
    pub fn new(rules: Vec<CategoryRule>) -> Self {
        let mut compiled: Vec<CompiledRule> = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = if let RuleMatchType::Regex = rule.match_type {
                    // An invalid pattern silently never matches.
                    regex::Regex::new(&rule.pattern).ok()
                } else {
                    None
                };
                CompiledRule {
                    rule,
                    compiled_regex,
                }
            })
            .collect();
        compiled.sort_by(|a, b| {
            b.rule
                .priority
                .cmp(&a.rule.priority)
                .then_with(|| a.rule.created_at.cmp(&b.rule.created_at))
                .then_with(|| a.rule.id.cmp(&b.rule.id))
        });
        Self { rules: compiled }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The first rule, in evaluation order, whose pattern matches the
    /// transaction's description and whose scope admits the transaction.
    pub fn find_match(&self, tx: &Transaction) -> Option<&CategoryRule> {
        self.rules
            .iter()
            .find(|cr| rule_matches(cr, tx))
            .map(|cr| &cr.rule)
    }
}

fn rule_matches(cr: &CompiledRule, tx: &Transaction) -> bool {
    if let Some(scope) = cr.rule.account_id {
        if scope != tx.account_id {
            return false;
        }
    }

    match cr.rule.match_type {
        RuleMatchType::Contains => tx
            .description
            .to_lowercase()
            .contains(&cr.rule.pattern.to_lowercase()),
        RuleMatchType::Regex => cr
            .compiled_regex
            .as_ref()
            .is_some_and(|re| re.is_match(&tx.description)),
    }
}

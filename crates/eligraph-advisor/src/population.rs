//! Population Engine: pushes authored rule sets into the graph store.

use std::collections::HashSet;

use eligraph_rules::{Rule, RuleSet};
use eligraph_storage::{RuleGraphStore, StoreError, UpsertOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateOptions {
    /// Run `clear_all` before writing any rule
    pub clear_first: bool,
}

/// One rule that could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationFailure {
    pub rule_id: String,
    pub cause: String,
}

/// Batch result. A non-empty `failed` list is a partial population, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub succeeded: usize,
    pub failed: Vec<PopulationFailure>,
    /// Elements removed by `clear_first`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleared: Option<usize>,
}

impl PopulationSummary {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed.len()
    }
}

/// Validate and upsert every definition of `rules`, category by category.
pub fn populate_rules(
    store: &RuleGraphStore,
    rules: &RuleSet,
) -> Result<PopulationSummary, StoreError> {
    populate_rules_with(store, rules, PopulateOptions::default())
}

/// [`populate_rules`] with options.
///
/// Only `clear_first` can fail the whole call; per-rule failures (malformed
/// definitions, store errors) are collected into the summary and the batch goes on.
/// A `rule_id` that appears again later in the batch is a failure: the first
/// definition is kept.
pub fn populate_rules_with(
    store: &RuleGraphStore,
    rules: &RuleSet,
    options: PopulateOptions,
) -> Result<PopulationSummary, StoreError> {
    let mut summary = PopulationSummary::default();

    if options.clear_first {
        summary.cleared = Some(store.clear_all()?);
    }

    let mut seen = HashSet::new();

    for (category, index, definition) in rules.iter() {
        let rule_id = if definition.rule_id.trim().is_empty() {
            format!("{category}[{index}]")
        } else {
            definition.rule_id.clone()
        };

        if !seen.insert(rule_id.clone()) {
            tracing::warn!(rule_id = %rule_id, category, "duplicate rule_id in rule set");
            summary.failed.push(PopulationFailure {
                cause: format!("duplicate rule_id `{rule_id}` (first definition kept)"),
                rule_id,
            });
            continue;
        }

        let result = Rule::try_from(definition)
            .map_err(StoreError::from)
            .and_then(|rule| store.upsert_rule(&rule));

        match result {
            Ok(outcome) => {
                summary.succeeded += 1;
                if outcome != UpsertOutcome::Unchanged {
                    tracing::debug!(rule_id = %rule_id, category, ?outcome, "stored rule");
                }
            }
            Err(err) => {
                tracing::warn!(rule_id = %rule_id, category, error = %err, "failed to store rule");
                summary.failed.push(PopulationFailure {
                    rule_id,
                    cause: err.to_string(),
                });
            }
        }
    }

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed.len(),
        "populated rule graph"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use eligraph_rules::{Facts, Scalar};

    const THREE_RULES: &str = r#"{
        "engineering": [
            {"rule_id": "SS_001", "description": "Engineering", "conclusion": "eligible_for_engineering",
             "conditions": {"type": "AND", "rules": [
                {"fact": "stream", "operator": "=", "value": "science"},
                {"fact": "aggregate_percentage", "operator": ">=", "value": 75}]}},
            {"rule_id": "SS_002", "description": "Broken", "conclusion": "never",
             "conditions": {"type": "AND", "rules": []}},
            {"rule_id": "SS_003", "description": "Top scorers", "conclusion": "eligible_for_scholarship",
             "conditions": {"fact": "aggregate_percentage", "operator": ">", "value": 90}}
        ]
    }"#;

    #[test]
    fn partial_failure_keeps_the_rest() {
        let store = RuleGraphStore::in_memory();
        let rules = RuleSet::from_json_str(THREE_RULES).unwrap();
        let summary = populate_rules(&store, &rules).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert!(summary.is_partial());
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].rule_id, "SS_002");
        assert!(summary.failed[0].cause.contains("no members"));

        let facts: Facts = [
            ("stream".to_string(), Scalar::from("science")),
            ("aggregate_percentage".to_string(), Scalar::from(95)),
        ]
        .into_iter()
        .collect();
        let ids: Vec<String> = store
            .query_eligibility(&facts)
            .unwrap()
            .into_iter()
            .map(|m| m.rule_id)
            .collect();
        assert_eq!(ids, vec!["SS_001", "SS_003"]);
    }

    #[test]
    fn missing_rule_id_is_reported_by_position() {
        let store = RuleGraphStore::in_memory();
        let rules = RuleSet::from_json_str(
            r#"{"medical": [{"conclusion": "x", "conditions": {"fact": "a", "operator": "=", "value": 1}}]}"#,
        )
        .unwrap();
        let summary = populate_rules(&store, &rules).unwrap();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed[0].rule_id, "medical[0]");
    }

    #[test]
    fn duplicate_rule_id_keeps_the_first_definition() {
        let store = RuleGraphStore::in_memory();
        let rules = RuleSet::from_json_str(
            r#"{
                "commerce": [{"rule_id": "DUP", "description": "first", "conclusion": "first",
                              "conditions": {"fact": "a", "operator": "=", "value": 1}}],
                "medical": [{"rule_id": "DUP", "description": "second", "conclusion": "second",
                             "conditions": {"fact": "a", "operator": "=", "value": 1}}]
            }"#,
        )
        .unwrap();
        let summary = populate_rules(&store, &rules).unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].rule_id, "DUP");
        assert!(summary.failed[0].cause.contains("duplicate rule_id"));

        let facts: Facts = [("a".to_string(), Scalar::from(1))].into_iter().collect();
        let matches = store.query_eligibility(&facts).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].conclusion, "first");
    }

    #[test]
    fn clear_first_reseeds() {
        let store = RuleGraphStore::in_memory();
        let rules = RuleSet::from_json_str(THREE_RULES).unwrap();
        populate_rules(&store, &rules).unwrap();
        let before = store.stats().unwrap();

        let summary =
            populate_rules_with(&store, &rules, PopulateOptions { clear_first: true }).unwrap();
        assert_eq!(summary.cleared, Some(before.nodes + before.edges));
        assert_eq!(store.stats().unwrap(), before);
    }

    #[test]
    fn closed_store_fails_every_rule() {
        let store = RuleGraphStore::in_memory();
        store.close();
        let rules = RuleSet::from_json_str(THREE_RULES).unwrap();
        let summary = populate_rules(&store, &rules).unwrap();
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.attempted(), 3);
    }
}

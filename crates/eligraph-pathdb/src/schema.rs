//! Persisted vocabulary of the rule graph.
//!
//! Node labels, edge types and property names are part of the storage contract:
//! any existing stored data uses exactly these spellings. Keeping them in one place
//! avoids drift between the writer (population) and the reader (evaluation).

// -----------------------------------------------------------------------------
// Node labels
// -----------------------------------------------------------------------------

pub const LABEL_RULE: &str = "Rule";
pub const LABEL_CONCLUSION: &str = "Conclusion";
pub const LABEL_CONDITION_GROUP: &str = "ConditionGroup";
pub const LABEL_CONDITION: &str = "Condition";
pub const LABEL_FACT: &str = "Fact";

pub const ALL_LABELS: [&str; 5] = [
    LABEL_RULE,
    LABEL_CONCLUSION,
    LABEL_CONDITION_GROUP,
    LABEL_CONDITION,
    LABEL_FACT,
];

// -----------------------------------------------------------------------------
// Edge types
// -----------------------------------------------------------------------------

/// Rule → Conclusion.
pub const EDGE_LEADS_TO: &str = "LEADS_TO";
/// Rule → root ConditionGroup.
pub const EDGE_HAS_CONDITION_GROUP: &str = "HAS_CONDITION_GROUP";
/// ConditionGroup → nested ConditionGroup.
pub const EDGE_HAS_MEMBER_CONDITION: &str = "HAS_MEMBER_CONDITION";
/// ConditionGroup → Condition, or Rule → root Condition.
pub const EDGE_HAS_CONDITION: &str = "HAS_CONDITION";
/// Condition → Fact.
pub const EDGE_USES_FACT: &str = "USES_FACT";

pub const ALL_EDGE_TYPES: [&str; 5] = [
    EDGE_LEADS_TO,
    EDGE_HAS_CONDITION_GROUP,
    EDGE_HAS_MEMBER_CONDITION,
    EDGE_HAS_CONDITION,
    EDGE_USES_FACT,
];

// -----------------------------------------------------------------------------
// Properties
// -----------------------------------------------------------------------------

pub const PROP_RULE_ID: &str = "rule_id";
pub const PROP_DESCRIPTION: &str = "description";
pub const PROP_NAME: &str = "name";
pub const PROP_GROUP_ID: &str = "group_id";
pub const PROP_TYPE: &str = "type";
pub const PROP_CONDITION_ID: &str = "condition_id";
pub const PROP_FACT_NAME: &str = "fact_name";
pub const PROP_OPERATOR: &str = "operator";
/// Canonical JSON text of the condition's literal.
pub const PROP_VALUE: &str = "value";

/// The merge key of each label: `(label, key property)`.
pub const NODE_KEYS: [(&str, &str); 5] = [
    (LABEL_RULE, PROP_RULE_ID),
    (LABEL_CONCLUSION, PROP_NAME),
    (LABEL_CONDITION_GROUP, PROP_GROUP_ID),
    (LABEL_CONDITION, PROP_CONDITION_ID),
    (LABEL_FACT, PROP_NAME),
];

/// Merge key property for `label`, if it is part of the rule graph vocabulary.
pub fn key_property(label: &str) -> Option<&'static str> {
    NODE_KEYS
        .iter()
        .find(|(l, _)| *l == label)
        .map(|(_, key)| *key)
}

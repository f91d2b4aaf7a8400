//! Rules and condition trees.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::digest;
use crate::error::RuleError;
use crate::scalar::{Facts, Scalar};

// ============================================================================
// Operators
// ============================================================================

/// Comparison operator of a leaf condition.
///
/// `=` and `==` are synonyms for evaluation but keep their authored spelling, since
/// the spelling is part of a condition's stored identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operator {
    Eq,
    DoubleEq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Eq,
        Operator::DoubleEq,
        Operator::Ne,
        Operator::Gt,
        Operator::Lt,
        Operator::Ge,
        Operator::Le,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::DoubleEq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Le => "<=",
        }
    }

    /// Apply `fact <op> expected`.
    ///
    /// Two numbers compare numerically. Any other pairing only supports equality and
    /// inequality, and equality is strict-typed: `80` never equals `"80"`. Ordering
    /// operators on non-numbers are false.
    pub fn compare(self, fact: &Scalar, expected: &Scalar) -> bool {
        if let (Scalar::Number(a), Scalar::Number(b)) = (fact, expected) {
            return match self {
                Self::Eq | Self::DoubleEq => a == b,
                Self::Ne => a != b,
                Self::Gt => a > b,
                Self::Lt => a < b,
                Self::Ge => a >= b,
                Self::Le => a <= b,
            };
        }
        match self {
            Self::Eq | Self::DoubleEq => fact == expected,
            Self::Ne => fact != expected,
            Self::Gt | Self::Lt | Self::Ge | Self::Le => false,
        }
    }
}

impl FromStr for Operator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == s.trim())
            .ok_or_else(|| RuleError::malformed(format!("unknown operator `{s}`")))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ============================================================================
// Groups
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKind {
    And,
    Or,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for GroupKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            _ => Err(RuleError::malformed(format!("unknown group type `{s}`"))),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Condition trees
// ============================================================================

/// An atomic predicate over one fact.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub fact: String,
    pub operator: Operator,
    pub value: Scalar,
}

impl Condition {
    pub fn new(fact: impl Into<String>, operator: Operator, value: impl Into<Scalar>) -> Self {
        Self {
            fact: fact.into(),
            operator,
            value: value.into(),
        }
    }

    /// Missing facts evaluate to false.
    pub fn evaluate(&self, facts: &Facts) -> bool {
        facts
            .get(&self.fact)
            .is_some_and(|actual| self.operator.compare(actual, &self.value))
    }
}

/// A condition tree: AND/OR groups over leaves, nested to any depth.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionExpr {
    Group {
        kind: GroupKind,
        members: Vec<ConditionExpr>,
    },
    Leaf(Condition),
}

impl ConditionExpr {
    pub fn and(members: Vec<ConditionExpr>) -> Self {
        Self::Group {
            kind: GroupKind::And,
            members,
        }
    }

    pub fn or(members: Vec<ConditionExpr>) -> Self {
        Self::Group {
            kind: GroupKind::Or,
            members,
        }
    }

    pub fn leaf(fact: impl Into<String>, operator: Operator, value: impl Into<Scalar>) -> Self {
        Self::Leaf(Condition::new(fact, operator, value))
    }

    /// Parse the authored JSON shape.
    ///
    /// A group is an object with `type` and `rules` (or `members`); a leaf is an
    /// object with `fact`, `operator` and `value`.
    pub fn from_json(value: &Value) -> Result<Self, RuleError> {
        let Value::Object(obj) = value else {
            return Err(RuleError::malformed(format!(
                "condition must be an object, got {value}"
            )));
        };

        if let Some(kind) = obj.get("type") {
            let kind = kind
                .as_str()
                .ok_or_else(|| RuleError::malformed("group `type` must be a string"))?
                .parse::<GroupKind>()?;
            let members = obj
                .get("rules")
                .or_else(|| obj.get("members"))
                .ok_or_else(|| RuleError::malformed(format!("{kind} group has no `rules`")))?;
            let Value::Array(members) = members else {
                return Err(RuleError::malformed(format!(
                    "{kind} group `rules` must be an array"
                )));
            };
            let members = members
                .iter()
                .map(Self::from_json)
                .collect::<Result<Vec<_>, _>>()?;
            let expr = Self::Group { kind, members };
            expr.validate()?;
            return Ok(expr);
        }

        if obj.contains_key("fact") {
            let fact = obj
                .get("fact")
                .and_then(Value::as_str)
                .ok_or_else(|| RuleError::malformed("condition `fact` must be a string"))?;
            let operator = obj
                .get("operator")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    RuleError::malformed(format!("condition on `{fact}` has no `operator`"))
                })?
                .parse::<Operator>()?;
            let raw_value = obj.get("value").ok_or_else(|| {
                RuleError::malformed(format!("condition on `{fact}` has no `value`"))
            })?;
            let value = Scalar::from_json(raw_value).ok_or_else(|| {
                RuleError::malformed(format!(
                    "condition on `{fact}` has non-scalar value {raw_value}"
                ))
            })?;
            let expr = Self::leaf(fact, operator, value);
            expr.validate()?;
            return Ok(expr);
        }

        Err(RuleError::malformed(
            "condition is neither a group (`type`) nor a leaf (`fact`)",
        ))
    }

    /// The authored JSON shape (inverse of [`ConditionExpr::from_json`]).
    pub fn to_json(&self) -> Value {
        match self {
            Self::Group { kind, members } => json!({
                "type": kind.as_str(),
                "rules": members.iter().map(Self::to_json).collect::<Vec<_>>(),
            }),
            Self::Leaf(c) => {
                let mut obj = Map::new();
                obj.insert("fact".to_string(), Value::String(c.fact.clone()));
                obj.insert(
                    "operator".to_string(),
                    Value::String(c.operator.symbol().to_string()),
                );
                obj.insert(
                    "value".to_string(),
                    serde_json::to_value(&c.value).unwrap_or(Value::Null),
                );
                Value::Object(obj)
            }
        }
    }

    /// Structural checks for trees built in code.
    pub fn validate(&self) -> Result<(), RuleError> {
        match self {
            Self::Group { kind, members } => {
                if members.is_empty() {
                    return Err(RuleError::malformed(format!("{kind} group has no members")));
                }
                members.iter().try_for_each(Self::validate)
            }
            Self::Leaf(c) => {
                if c.fact.trim().is_empty() {
                    return Err(RuleError::malformed("condition has an empty fact name"));
                }
                if !c.value.is_finite() {
                    return Err(RuleError::malformed(format!(
                        "condition on `{}` has a non-finite value",
                        c.fact
                    )));
                }
                Ok(())
            }
        }
    }

    /// Reference evaluation against in-memory facts.
    pub fn evaluate(&self, facts: &Facts) -> bool {
        match self {
            Self::Group {
                kind: GroupKind::And,
                members,
            } => !members.is_empty() && members.iter().all(|m| m.evaluate(facts)),
            Self::Group {
                kind: GroupKind::Or,
                members,
            } => members.iter().any(|m| m.evaluate(facts)),
            Self::Leaf(c) => c.evaluate(facts),
        }
    }

    /// Canonical, order-independent serialization (see [`digest::canonical_expr`]).
    pub fn canonical(&self) -> String {
        digest::canonical_expr(self)
    }

    pub fn depth(&self) -> usize {
        match self {
            Self::Group { members, .. } => 1 + members.iter().map(Self::depth).max().unwrap_or(0),
            Self::Leaf(_) => 1,
        }
    }

    /// Distinct fact names referenced anywhere in the tree, sorted.
    pub fn fact_names(&self) -> Vec<String> {
        fn walk(expr: &ConditionExpr, out: &mut std::collections::BTreeSet<String>) {
            match expr {
                ConditionExpr::Group { members, .. } => members.iter().for_each(|m| walk(m, out)),
                ConditionExpr::Leaf(c) => {
                    out.insert(c.fact.clone());
                }
            }
        }
        let mut out = std::collections::BTreeSet::new();
        walk(self, &mut out);
        out.into_iter().collect()
    }
}

impl Serialize for ConditionExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConditionExpr {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Rules
// ============================================================================

/// A validated eligibility rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rule {
    rule_id: String,
    description: String,
    conclusion: String,
    conditions: ConditionExpr,
}

impl Rule {
    pub fn new(
        rule_id: impl Into<String>,
        description: impl Into<String>,
        conclusion: impl Into<String>,
        conditions: ConditionExpr,
    ) -> Result<Self, RuleError> {
        let rule_id = rule_id.into();
        let conclusion = conclusion.into();
        if rule_id.trim().is_empty() {
            return Err(RuleError::malformed("rule_id is empty"));
        }
        if conclusion.trim().is_empty() {
            return Err(RuleError::malformed(format!(
                "rule `{rule_id}` has an empty conclusion"
            )));
        }
        conditions.validate().map_err(|e| match e {
            RuleError::Malformed(reason) => {
                RuleError::malformed(format!("rule `{rule_id}`: {reason}"))
            }
            other => other,
        })?;
        Ok(Self {
            rule_id,
            description: description.into(),
            conclusion,
            conditions,
        })
    }

    pub fn rule_id(&self) -> &str {
        &self.rule_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn conclusion(&self) -> &str {
        &self.conclusion
    }

    pub fn conditions(&self) -> &ConditionExpr {
        &self.conditions
    }

    pub fn evaluate(&self, facts: &Facts) -> bool {
        self.conditions.evaluate(facts)
    }
}

/// A rule as authored in configuration, before validation.
///
/// Fields default to empty so that a definition missing e.g. `conclusion` still
/// deserializes and is rejected per rule (not per file) during population.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleDefinition {
    #[serde(default)]
    pub rule_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub conclusion: String,
    #[serde(default)]
    pub conditions: Value,
}

impl TryFrom<&RuleDefinition> for Rule {
    type Error = RuleError;

    fn try_from(def: &RuleDefinition) -> Result<Self, Self::Error> {
        if def.rule_id.trim().is_empty() {
            return Err(RuleError::malformed("rule_id is empty"));
        }
        let conditions = ConditionExpr::from_json(&def.conditions).map_err(|e| match e {
            RuleError::Malformed(reason) => {
                RuleError::malformed(format!("rule `{}`: {reason}", def.rule_id))
            }
            other => other,
        })?;
        Rule::new(
            def.rule_id.clone(),
            def.description.clone(),
            def.conclusion.clone(),
            conditions,
        )
    }
}

impl From<&Rule> for RuleDefinition {
    fn from(rule: &Rule) -> Self {
        Self {
            rule_id: rule.rule_id.clone(),
            description: rule.description.clone(),
            conclusion: rule.conclusion.clone(),
            conditions: rule.conditions.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facts(pairs: &[(&str, Scalar)]) -> Facts {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn operators_round_trip_through_symbols() {
        for op in Operator::ALL {
            assert_eq!(op.symbol().parse::<Operator>().unwrap(), op);
        }
        assert!("=~".parse::<Operator>().unwrap_err().is_malformed());
    }

    #[test]
    fn numeric_comparison() {
        let eighty = Scalar::from(80);
        assert!(Operator::Ge.compare(&eighty, &Scalar::from(75)));
        assert!(Operator::Gt.compare(&eighty, &Scalar::from(75)));
        assert!(!Operator::Lt.compare(&eighty, &Scalar::from(75)));
        assert!(Operator::Le.compare(&eighty, &Scalar::from(80)));
        assert!(Operator::Eq.compare(&eighty, &Scalar::Number(80.0)));
        assert!(Operator::DoubleEq.compare(&eighty, &Scalar::Number(80.0)));
        assert!(Operator::Ne.compare(&eighty, &Scalar::from(81)));
    }

    #[test]
    fn equality_is_strict_typed() {
        let num = Scalar::from(80);
        let text = Scalar::from("80");
        assert!(!Operator::Eq.compare(&num, &text));
        assert!(Operator::Ne.compare(&num, &text));
        assert!(!Operator::Ge.compare(&text, &Scalar::from("70")));
        assert!(Operator::Eq.compare(&Scalar::Bool(true), &Scalar::Bool(true)));
        assert!(!Operator::Eq.compare(&Scalar::Bool(true), &Scalar::from("true")));
    }

    #[test]
    fn nested_reference_evaluation() {
        let expr = ConditionExpr::and(vec![
            ConditionExpr::leaf("completed", Operator::Eq, true),
            ConditionExpr::or(vec![
                ConditionExpr::leaf("jee", Operator::Ge, 90),
                ConditionExpr::leaf("sat", Operator::Ge, 1400),
            ]),
        ]);
        let matching = facts(&[
            ("completed", Scalar::Bool(true)),
            ("jee", Scalar::from(50)),
            ("sat", Scalar::from(1500)),
        ]);
        assert!(expr.evaluate(&matching));

        let missing_sat = facts(&[("completed", Scalar::Bool(true)), ("jee", Scalar::from(50))]);
        assert!(!expr.evaluate(&missing_sat));
    }

    #[test]
    fn parses_authored_group_shape() {
        let value = json!({
            "type": "AND",
            "rules": [
                {"fact": "stream", "operator": "=", "value": "science"},
                {"type": "or", "members": [
                    {"fact": "jee", "operator": ">=", "value": 90},
                    {"fact": "sat", "operator": ">=", "value": 1400}
                ]}
            ]
        });
        let expr = ConditionExpr::from_json(&value).unwrap();
        assert_eq!(expr.depth(), 3);
        assert_eq!(expr.fact_names(), vec!["jee", "sat", "stream"]);
        assert_eq!(ConditionExpr::from_json(&expr.to_json()).unwrap(), expr);
    }

    #[test]
    fn rejects_malformed_shapes() {
        let cases = [
            json!("AND"),
            json!({"type": "AND", "rules": []}),
            json!({"type": "XOR", "rules": [{"fact": "a", "operator": "=", "value": 1}]}),
            json!({"fact": "a", "operator": "~", "value": 1}),
            json!({"fact": "a", "operator": "=", "value": [1]}),
            json!({"fact": "a", "operator": "="}),
            json!({"description": "neither"}),
        ];
        for case in cases {
            let err = ConditionExpr::from_json(&case).unwrap_err();
            assert!(err.is_malformed(), "{case} should be malformed");
        }
    }

    #[test]
    fn rule_requires_id_and_conclusion() {
        let leaf = ConditionExpr::leaf("pct", Operator::Ge, 75);
        assert!(Rule::new("", "d", "c", leaf.clone()).is_err());
        assert!(Rule::new("R1", "d", " ", leaf.clone()).is_err());
        assert!(Rule::new("R1", "d", "c", ConditionExpr::or(vec![])).is_err());
        assert!(Rule::new("R1", "d", "c", leaf).is_ok());
    }

    #[test]
    fn definition_round_trip() {
        let rule = Rule::new(
            "SS_001",
            "Engineering (India)",
            "eligible_for_engineering_india",
            ConditionExpr::and(vec![
                ConditionExpr::leaf("stream", Operator::Eq, "science"),
                ConditionExpr::leaf("aggregate_percentage", Operator::Ge, 75),
            ]),
        )
        .unwrap();
        let def = RuleDefinition::from(&rule);
        assert_eq!(Rule::try_from(&def).unwrap(), rule);
    }
}

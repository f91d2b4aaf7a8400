//! Evaluation of stored rules against student facts.
//!
//! Rules are read back from the graph and evaluated recursively: a leaf compares one
//! fact, a group combines its members (AND: all, OR: any) to any depth. Anything that
//! does not look like a well-formed rule (missing or multiple roots, missing
//! conclusion, unknown operator or group type, unparsable value, a cycle) makes that
//! rule a non-match; it never fails the query.

use std::collections::{HashMap, HashSet};

use eligraph_pathdb::schema::*;
use eligraph_pathdb::PathDB;
use eligraph_rules::{Condition, Facts, GroupKind, Operator, Scalar};
use serde::{Deserialize, Serialize};

/// A rule whose condition tree holds for the given facts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EligibilityMatch {
    pub rule_id: String,
    pub description: String,
    pub conclusion: String,
}

/// Why a stored rule could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Anomaly(String);

impl std::fmt::Display for Anomaly {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn anomaly(message: impl Into<String>) -> Anomaly {
    Anomaly(message.into())
}

/// All rules matching `facts`, sorted by `rule_id`.
pub fn matching_rules(db: &PathDB, facts: &Facts) -> Vec<EligibilityMatch> {
    let mut evaluator = Evaluator::new(db, facts);
    let mut matches = Vec::new();

    for rule in db.find_by_label(LABEL_RULE).iter() {
        match evaluator.rule(rule) {
            Ok(Some(m)) => matches.push(m),
            Ok(None) => {}
            Err(err) => {
                let rule_id = db.node_prop(rule, PROP_RULE_ID).unwrap_or_default();
                tracing::debug!(
                    rule_id = %rule_id,
                    node = rule,
                    reason = %err,
                    "skipping malformed stored rule"
                );
            }
        }
    }

    matches.sort();
    matches
}

/// The single root (group or leaf) of a stored rule.
pub(crate) fn rule_root(db: &PathDB, rule: u32) -> Result<u32, Anomaly> {
    let mut roots = db.follow(rule, EDGE_HAS_CONDITION_GROUP);
    roots |= db.follow(rule, EDGE_HAS_CONDITION);
    match roots.len() {
        1 => roots.min().ok_or_else(|| anomaly("rule has no root")),
        0 => Err(anomaly("rule has no root condition")),
        n => Err(anomaly(format!("rule has {n} root conditions"))),
    }
}

/// The single conclusion node of a stored rule.
pub(crate) fn rule_conclusion(db: &PathDB, rule: u32) -> Result<u32, Anomaly> {
    let conclusions = db.follow(rule, EDGE_LEADS_TO);
    match conclusions.len() {
        1 => conclusions.min().ok_or_else(|| anomaly("rule has no conclusion")),
        0 => Err(anomaly("rule has no conclusion")),
        n => Err(anomaly(format!("rule has {n} conclusions"))),
    }
}

/// Members of a stored group: nested groups and leaf conditions.
pub(crate) fn group_members(db: &PathDB, group: u32) -> roaring::RoaringBitmap {
    let mut members = db.follow(group, EDGE_HAS_MEMBER_CONDITION);
    members |= db.follow(group, EDGE_HAS_CONDITION);
    members
}

struct Evaluator<'a> {
    db: &'a PathDB,
    facts: &'a Facts,
    /// Nodes on the current descent path
    visiting: HashSet<u32>,
    /// Results of fully evaluated nodes
    memo: HashMap<u32, bool>,
}

impl<'a> Evaluator<'a> {
    fn new(db: &'a PathDB, facts: &'a Facts) -> Self {
        Self {
            db,
            facts,
            visiting: HashSet::new(),
            memo: HashMap::new(),
        }
    }

    fn rule(&mut self, rule: u32) -> Result<Option<EligibilityMatch>, Anomaly> {
        let rule_id = self
            .db
            .node_prop(rule, PROP_RULE_ID)
            .ok_or_else(|| anomaly("rule has no rule_id"))?;
        let conclusion = rule_conclusion(self.db, rule)?;
        let conclusion = self
            .db
            .node_prop(conclusion, PROP_NAME)
            .ok_or_else(|| anomaly("conclusion has no name"))?;
        let root = rule_root(self.db, rule)?;

        self.visiting.clear();
        if !self.node(root)? {
            return Ok(None);
        }

        Ok(Some(EligibilityMatch {
            rule_id,
            description: self.db.node_prop(rule, PROP_DESCRIPTION).unwrap_or_default(),
            conclusion,
        }))
    }

    fn node(&mut self, node: u32) -> Result<bool, Anomaly> {
        if let Some(&result) = self.memo.get(&node) {
            return Ok(result);
        }
        if !self.visiting.insert(node) {
            return Err(anomaly(format!("cycle through node {node}")));
        }

        let result = match self.db.node_label(node).as_deref() {
            Some(LABEL_CONDITION_GROUP) => self.group(node),
            Some(LABEL_CONDITION) => self.condition(node),
            Some(other) => Err(anomaly(format!(
                "unexpected {other} node {node} in condition tree"
            ))),
            None => Err(anomaly(format!("dangling node {node} in condition tree"))),
        };

        self.visiting.remove(&node);
        let result = result?;
        self.memo.insert(node, result);
        Ok(result)
    }

    fn group(&mut self, group: u32) -> Result<bool, Anomaly> {
        let kind: GroupKind = self
            .db
            .node_prop(group, PROP_TYPE)
            .ok_or_else(|| anomaly(format!("group {group} has no type")))?
            .parse()
            .map_err(|e| anomaly(format!("group {group}: {e}")))?;

        let members = group_members(self.db, group);
        if members.is_empty() {
            return Err(anomaly(format!("{kind} group {group} has no members")));
        }

        // No short-circuit: a malformed member poisons the group even when a
        // sibling already decides it.
        let results = members
            .iter()
            .map(|member| self.node(member))
            .collect::<Result<Vec<bool>, Anomaly>>()?;
        Ok(match kind {
            GroupKind::And => results.iter().all(|&holds| holds),
            GroupKind::Or => results.iter().any(|&holds| holds),
        })
    }

    fn condition(&mut self, node: u32) -> Result<bool, Anomaly> {
        Ok(stored_condition(self.db, node)?.evaluate(self.facts))
    }
}

/// Decode a stored `Condition` node.
pub(crate) fn stored_condition(db: &PathDB, node: u32) -> Result<Condition, Anomaly> {
    let fact = db
        .node_prop(node, PROP_FACT_NAME)
        .ok_or_else(|| anomaly(format!("condition {node} has no fact_name")))?;
    let operator: Operator = db
        .node_prop(node, PROP_OPERATOR)
        .ok_or_else(|| anomaly(format!("condition {node} has no operator")))?
        .parse()
        .map_err(|e| anomaly(format!("condition {node}: {e}")))?;
    let raw = db
        .node_prop(node, PROP_VALUE)
        .ok_or_else(|| anomaly(format!("condition {node} has no value")))?;
    let value = Scalar::parse_canonical(&raw)
        .ok_or_else(|| anomaly(format!("condition {node} has unparsable value {raw}")))?;

    let uses = db.follow(node, EDGE_USES_FACT);
    if uses.len() != 1 {
        return Err(anomaly(format!(
            "condition {node} references {} facts",
            uses.len()
        )));
    }

    Ok(Condition::new(fact, operator, value))
}

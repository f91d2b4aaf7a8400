//! Writing a validated rule into the graph.

use std::collections::BTreeSet;

use eligraph_pathdb::schema::*;
use eligraph_rules::digest;
use eligraph_rules::{ConditionExpr, Rule};

use crate::error::StoreError;
use crate::eval::group_members;
use crate::transaction::Transaction;

/// Merge `rule` into the graph.
///
/// When the rule already exists with a different condition tree, the old tree
/// (which is scoped to this rule) is deleted first; a changed conclusion replaces
/// the `LEADS_TO` edge. Shared `Fact` and `Conclusion` nodes are never deleted.
///
/// Returns the rule node and whether it was newly created.
pub(crate) fn write_rule(
    tx: &mut Transaction<'_>,
    rule: &Rule,
) -> Result<(u32, bool), StoreError> {
    let (rule_node, created) = tx.merge_node(LABEL_RULE, PROP_RULE_ID, rule.rule_id());
    tx.set_prop(rule_node, PROP_DESCRIPTION, rule.description())?;

    let root_id = digest::node_id(rule.rule_id(), rule.conditions());
    if !created {
        replace_stale_roots(tx, rule_node, &root_id)?;
        replace_stale_conclusions(tx, rule_node, rule.conclusion());
    }

    write_expr(tx, rule_node, rule.rule_id(), rule.conditions(), true)?;

    let (conclusion, _) = tx.merge_node(LABEL_CONCLUSION, PROP_NAME, rule.conclusion());
    tx.merge_edge(EDGE_LEADS_TO, rule_node, conclusion)?;

    Ok((rule_node, created))
}

fn write_expr(
    tx: &mut Transaction<'_>,
    parent: u32,
    scope: &str,
    expr: &ConditionExpr,
    is_root: bool,
) -> Result<(), StoreError> {
    match expr {
        ConditionExpr::Group { kind, members } => {
            let id = digest::group_id(scope, *kind, members);
            let (node, _) = tx.merge_node(LABEL_CONDITION_GROUP, PROP_GROUP_ID, &id);
            tx.set_prop(node, PROP_TYPE, kind.as_str())?;
            let edge = if is_root {
                EDGE_HAS_CONDITION_GROUP
            } else {
                EDGE_HAS_MEMBER_CONDITION
            };
            tx.merge_edge(edge, parent, node)?;
            for member in members {
                write_expr(tx, node, &id, member, false)?;
            }
        }
        ConditionExpr::Leaf(condition) => {
            let id = digest::condition_id(scope, condition);
            let (node, _) = tx.merge_node(LABEL_CONDITION, PROP_CONDITION_ID, &id);
            tx.set_prop(node, PROP_FACT_NAME, &condition.fact)?;
            tx.set_prop(node, PROP_OPERATOR, condition.operator.symbol())?;
            tx.set_prop(node, PROP_VALUE, &condition.value.canonical_json())?;
            tx.merge_edge(EDGE_HAS_CONDITION, parent, node)?;

            let (fact, _) = tx.merge_node(LABEL_FACT, PROP_NAME, &condition.fact);
            tx.merge_edge(EDGE_USES_FACT, node, fact)?;
        }
    }
    Ok(())
}

/// Stable id stored on a tree node (`group_id` or `condition_id`).
fn tree_node_id(tx: &Transaction<'_>, node: u32) -> Option<String> {
    let db = tx.db();
    db.node_prop(node, PROP_GROUP_ID)
        .or_else(|| db.node_prop(node, PROP_CONDITION_ID))
}

fn replace_stale_roots(
    tx: &mut Transaction<'_>,
    rule_node: u32,
    root_id: &str,
) -> Result<(), StoreError> {
    let mut roots = tx.db().follow(rule_node, EDGE_HAS_CONDITION_GROUP);
    roots |= tx.db().follow(rule_node, EDGE_HAS_CONDITION);

    for root in roots.iter() {
        if tree_node_id(tx, root).as_deref() == Some(root_id) {
            continue;
        }
        tracing::debug!(node = root, "replacing condition tree of re-upserted rule");
        for edge_type in [EDGE_HAS_CONDITION_GROUP, EDGE_HAS_CONDITION] {
            if let Some(edge) = tx.db().find_edge(rule_node, edge_type, root) {
                tx.remove_edge(edge);
            }
        }
        delete_subtree(tx, root)?;
    }
    Ok(())
}

fn replace_stale_conclusions(tx: &mut Transaction<'_>, rule_node: u32, conclusion: &str) {
    let targets = tx.db().follow(rule_node, EDGE_LEADS_TO);
    for target in targets.iter() {
        if tx.db().node_prop(target, PROP_NAME).as_deref() == Some(conclusion) {
            continue;
        }
        if let Some(edge) = tx.db().find_edge(rule_node, EDGE_LEADS_TO, target) {
            tx.remove_edge(edge);
        }
    }
}

/// Delete every group/condition node reachable from `root`, unless something
/// outside the subtree still points at it.
fn delete_subtree(tx: &mut Transaction<'_>, root: u32) -> Result<(), StoreError> {
    let mut subtree = BTreeSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if !subtree.insert(node) {
            continue;
        }
        stack.extend(group_members(tx.db(), node).iter());
    }

    let doomed: Vec<u32> = subtree
        .iter()
        .copied()
        .filter(|&node| {
            let db = tx.db();
            [EDGE_HAS_CONDITION_GROUP, EDGE_HAS_MEMBER_CONDITION, EDGE_HAS_CONDITION]
                .iter()
                .flat_map(|edge_type| db.follow_back(node, edge_type))
                .all(|parent| subtree.contains(&parent))
        })
        .collect();

    for node in doomed {
        tx.remove_node(node)?;
    }
    Ok(())
}

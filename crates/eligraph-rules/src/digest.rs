//! Canonical condition serialization and stable node ids (versioned).
//!
//! Condition groups and conditions are merged by identity when a rule is
//! persisted. The identity is a deterministic function of the node's parent scope
//! and its content, specified once here so population and any verification tooling
//! compute the same ids:
//!
//! - leaf canonical form: `leaf(<fact>|<op>|<value-json>)`
//! - group canonical form: `group(<TYPE>|[<m1>,<m2>,...])`, members sorted and
//!   de-duplicated (order-independent set semantics)
//! - hash: **FNV-1a 64-bit** over the UTF-8 bytes, 16 lowercase hex digits
//! - group id: `group:fnv1a64:<hex>` of
//!   `scope=<parent>|group=<TYPE>|members=<m1>;<m2>;...`
//! - condition id: `cond:fnv1a64:<hex>` of
//!   `scope=<parent>|fact=<fact>|op=<op>|value=<value-json>`
//!
//! The parent of a root node is the rule id; the parent of a nested node is its
//! group's id. Identical sub-structures under one parent therefore merge, while the
//! same content under a different parent is a distinct node.
//!
//! This is **not** a security primitive: collisions are possible in principle and
//! de-duplication is best-effort.

use std::collections::BTreeSet;

use crate::rule::{Condition, ConditionExpr, GroupKind};

/// Prefix of serialized group ids.
pub const GROUP_ID_V1_PREFIX: &str = "group:fnv1a64:";

/// Prefix of serialized condition ids.
pub const CONDITION_ID_V1_PREFIX: &str = "cond:fnv1a64:";

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x00000100000001b3;

fn fnv1a64_add(hash: &mut u64, s: &str) {
    for b in s.as_bytes() {
        *hash ^= (*b) as u64;
        *hash = hash.wrapping_mul(FNV_PRIME);
    }
}

/// FNV-1a 64-bit over arbitrary bytes, as 16 lowercase hex digits.
pub fn fnv1a64_hex(bytes: &[u8]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= (*b) as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    format!("{hash:016x}")
}

/// Canonical form of a single leaf condition.
pub fn canonical_condition(condition: &Condition) -> String {
    format!(
        "leaf({}|{}|{})",
        condition.fact,
        condition.operator.symbol(),
        condition.value.canonical_json()
    )
}

/// Canonical form of a condition tree.
pub fn canonical_expr(expr: &ConditionExpr) -> String {
    match expr {
        ConditionExpr::Leaf(c) => canonical_condition(c),
        ConditionExpr::Group { kind, members } => {
            let members = canonical_member_set(members);
            let joined: Vec<&str> = members.iter().map(String::as_str).collect();
            format!("group({}|[{}])", kind.as_str(), joined.join(","))
        }
    }
}

/// Sorted, de-duplicated canonical forms of a group's members.
pub fn canonical_member_set(members: &[ConditionExpr]) -> BTreeSet<String> {
    members.iter().map(canonical_expr).collect()
}

/// Stable id of a condition group under `parent_scope`.
pub fn group_id(parent_scope: &str, kind: GroupKind, members: &[ConditionExpr]) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    fnv1a64_add(&mut hash, "scope=");
    fnv1a64_add(&mut hash, parent_scope);
    fnv1a64_add(&mut hash, "|group=");
    fnv1a64_add(&mut hash, kind.as_str());
    fnv1a64_add(&mut hash, "|members=");
    for (i, member) in canonical_member_set(members).iter().enumerate() {
        if i > 0 {
            fnv1a64_add(&mut hash, ";");
        }
        fnv1a64_add(&mut hash, member);
    }
    format!("{GROUP_ID_V1_PREFIX}{hash:016x}")
}

/// Stable id of a leaf condition under `parent_scope`.
pub fn condition_id(parent_scope: &str, condition: &Condition) -> String {
    let mut hash = FNV_OFFSET_BASIS;
    fnv1a64_add(&mut hash, "scope=");
    fnv1a64_add(&mut hash, parent_scope);
    fnv1a64_add(&mut hash, "|fact=");
    fnv1a64_add(&mut hash, &condition.fact);
    fnv1a64_add(&mut hash, "|op=");
    fnv1a64_add(&mut hash, condition.operator.symbol());
    fnv1a64_add(&mut hash, "|value=");
    fnv1a64_add(&mut hash, &condition.value.canonical_json());
    format!("{CONDITION_ID_V1_PREFIX}{hash:016x}")
}

/// Stable id of any tree node under `parent_scope`.
pub fn node_id(parent_scope: &str, expr: &ConditionExpr) -> String {
    match expr {
        ConditionExpr::Group { kind, members } => group_id(parent_scope, *kind, members),
        ConditionExpr::Leaf(c) => condition_id(parent_scope, c),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Operator;

    fn jee() -> ConditionExpr {
        ConditionExpr::leaf("jee", Operator::Ge, 90)
    }

    fn neet() -> ConditionExpr {
        ConditionExpr::leaf("neet", Operator::Ge, 500)
    }

    #[test]
    fn fnv_matches_reference_vectors() {
        assert_eq!(fnv1a64_hex(b""), "cbf29ce484222325");
        assert_eq!(fnv1a64_hex(b"a"), "af63dc4c8601ec8c");
    }

    #[test]
    fn ids_have_expected_prefix_and_width() {
        let gid = group_id("R1", GroupKind::Or, &[jee(), neet()]);
        assert!(gid.starts_with(GROUP_ID_V1_PREFIX));
        assert_eq!(gid.len(), GROUP_ID_V1_PREFIX.len() + 16);

        let ConditionExpr::Leaf(c) = jee() else {
            unreachable!()
        };
        let cid = condition_id("R1", &c);
        assert!(cid.starts_with(CONDITION_ID_V1_PREFIX));
        assert_eq!(cid.len(), CONDITION_ID_V1_PREFIX.len() + 16);
    }

    #[test]
    fn group_id_ignores_member_order_and_duplicates() {
        let a = group_id("R1", GroupKind::Or, &[jee(), neet()]);
        let b = group_id("R1", GroupKind::Or, &[neet(), jee(), jee()]);
        assert_eq!(a, b);
    }

    #[test]
    fn group_id_depends_on_scope_and_kind() {
        let base = group_id("R1", GroupKind::Or, &[jee(), neet()]);
        assert_ne!(base, group_id("R2", GroupKind::Or, &[jee(), neet()]));
        assert_ne!(base, group_id("R1", GroupKind::And, &[jee(), neet()]));
    }

    #[test]
    fn condition_id_depends_on_scope() {
        let ConditionExpr::Leaf(c) = jee() else {
            unreachable!()
        };
        assert_eq!(condition_id("R1", &c), condition_id("R1", &c));
        assert_ne!(condition_id("R1", &c), condition_id("R2", &c));
    }

    #[test]
    fn canonical_forms_are_readable() {
        assert_eq!(canonical_expr(&jee()), "leaf(jee|>=|90)");
        let group = ConditionExpr::or(vec![neet(), jee()]);
        assert_eq!(
            canonical_expr(&group),
            "group(OR|[leaf(jee|>=|90),leaf(neet|>=|500)])"
        );
    }
}

//! Eligraph rule model
//!
//! This crate defines the in-memory representation of eligibility rules and the
//! canonical identity scheme used when they are persisted as a graph:
//!
//! - [`Scalar`]: the literal values facts and conditions carry (`bool`, number, text)
//! - [`ConditionExpr`]: a tree of AND/OR groups over atomic [`Condition`] leaves
//! - [`Rule`]: a validated rule (`rule_id`, description, conclusion, condition tree)
//! - [`RuleDefinition`] / [`RuleSet`]: the authored (unvalidated) JSON shape, grouped
//!   by category
//! - [`digest`]: canonical serialization + FNV-1a node ids shared by population and
//!   any tooling that needs to recompute stored identities
//!
//! Validation happens once, when a [`Rule`] is built. Anything that reaches the graph
//! store has a known operator, a known group type, a non-empty group and a scalar
//! literal.

pub mod digest;
pub mod error;
pub mod rule;
pub mod ruleset;
pub mod scalar;

pub use error::RuleError;
pub use rule::{Condition, ConditionExpr, GroupKind, Operator, Rule, RuleDefinition};
pub use ruleset::RuleSet;
pub use scalar::{Facts, Scalar};

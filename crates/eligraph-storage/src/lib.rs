//! Eligraph Rule Graph Store
//!
//! Persists eligibility rules as a labeled property graph and evaluates them
//! against student facts:
//!
//! ```text
//!   Rule ──LEADS_TO──────────────► Conclusion
//!    │
//!    ├─HAS_CONDITION_GROUP─► ConditionGroup ──HAS_MEMBER_CONDITION─► ConditionGroup ...
//!    │                            │
//!    │                            └─HAS_CONDITION─► Condition ──USES_FACT─► Fact
//!    │
//!    └─HAS_CONDITION (leaf root)─► Condition ──USES_FACT─► Fact
//! ```
//!
//! ## Key Features
//!
//! - **Idempotent**: nodes merge by stable identity, so re-upserting a rule set
//!   leaves node and edge counts unchanged
//! - **Transactional**: each rule is written under the write lock with an undo
//!   journal; any failure (including snapshot persistence) rolls it back
//! - **Recursive evaluation**: AND/OR groups nest to any depth; malformed stored
//!   structure is a non-match, never a query failure
//! - **Snapshots**: file-backed stores persist after every write

pub mod config;
pub mod error;
pub mod eval;
pub mod store;
pub mod transaction;

mod writer;

pub use config::StoreConfig;
pub use error::StoreError;
pub use eval::EligibilityMatch;
pub use store::{GraphStats, RuleGraphStore, UpsertOutcome};

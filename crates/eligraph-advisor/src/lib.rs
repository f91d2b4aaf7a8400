//! Eligraph advisor
//!
//! The application layer over the rule graph store:
//!
//! - [`population`]: push categorized rule sets into the store, isolating per-rule
//!   failures
//! - [`evaluator`]: answer "which rules does this student satisfy?"
//! - [`llm`] / [`consultant`]: turn eligibility results into advice through a
//!   chat-completion model
//! - [`conversation`]: caller-owned chat history and turn processing

pub mod consultant;
pub mod conversation;
pub mod evaluator;
pub mod llm;
pub mod population;

pub use consultant::{LlmConsultant, SERVICE_APOLOGY};
pub use conversation::{Advisor, ConversationState};
pub use evaluator::EligibilityEvaluator;
pub use llm::{LLMError, LLMProvider, ResponseGenerator, ServiceUnavailableError};
pub use population::{
    populate_rules, populate_rules_with, PopulateOptions, PopulationFailure, PopulationSummary,
};

//! Eligibility Evaluator: the caller-facing query entry point.

use eligraph_rules::Facts;
use eligraph_storage::{EligibilityMatch, RuleGraphStore, StoreError};

#[derive(Debug, Clone)]
pub struct EligibilityEvaluator {
    store: RuleGraphStore,
}

impl EligibilityEvaluator {
    pub fn new(store: RuleGraphStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RuleGraphStore {
        &self.store
    }

    /// Matching rules, sorted by rule id, exactly as the store returns them.
    pub fn evaluate(&self, facts: &Facts) -> Result<Vec<EligibilityMatch>, StoreError> {
        self.store.query_eligibility(facts)
    }

    /// Like [`Self::evaluate`], but an unusable store yields no eligibility so the
    /// consultant can still answer from general knowledge.
    pub fn evaluate_or_empty(&self, facts: &Facts) -> Vec<EligibilityMatch> {
        match self.evaluate(facts) {
            Ok(matches) => matches,
            Err(err) => {
                tracing::warn!(error = %err, "eligibility unavailable, continuing without it");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eligraph_rules::{ConditionExpr, Operator, Rule, Scalar};

    #[test]
    fn degrades_to_empty_when_closed() {
        let store = RuleGraphStore::in_memory();
        let rule = Rule::new(
            "R1",
            "Any",
            "ok",
            ConditionExpr::leaf("pct", Operator::Ge, 0),
        )
        .unwrap();
        store.upsert_rule(&rule).unwrap();

        let evaluator = EligibilityEvaluator::new(store.clone());
        let facts: Facts = [("pct".to_string(), Scalar::from(10))].into_iter().collect();
        assert_eq!(evaluator.evaluate(&facts).unwrap().len(), 1);

        store.close();
        assert!(evaluator.evaluate(&facts).is_err());
        assert!(evaluator.evaluate_or_empty(&facts).is_empty());
    }
}

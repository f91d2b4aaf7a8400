use eligraph_rules::{ConditionExpr, Facts, GroupKind, Operator, Rule, Scalar};
use eligraph_storage::RuleGraphStore;
use proptest::prelude::*;

const FACTS: [&str; 4] = ["pct", "jee", "completed", "board"];

fn scalar() -> impl Strategy<Value = Scalar> {
    prop_oneof![
        any::<bool>().prop_map(Scalar::Bool),
        (0i64..100).prop_map(Scalar::from),
        proptest::sample::select(vec!["CBSE", "ICSE", "science"]).prop_map(Scalar::from),
    ]
}

fn leaf() -> impl Strategy<Value = ConditionExpr> {
    (
        proptest::sample::select(FACTS.to_vec()),
        proptest::sample::select(Operator::ALL.to_vec()),
        scalar(),
    )
        .prop_map(|(fact, op, value)| ConditionExpr::leaf(fact, op, value))
}

fn expr() -> impl Strategy<Value = ConditionExpr> {
    leaf().prop_recursive(3, 16, 3, |inner| {
        (
            prop_oneof![Just(GroupKind::And), Just(GroupKind::Or)],
            proptest::collection::vec(inner, 1..4),
        )
            .prop_map(|(kind, members)| ConditionExpr::Group { kind, members })
    })
}

fn facts() -> impl Strategy<Value = Facts> {
    proptest::collection::btree_map(
        proptest::sample::select(FACTS.to_vec()).prop_map(str::to_string),
        scalar(),
        0..4,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn stored_rules_evaluate_like_the_model(
        trees in proptest::collection::vec(expr(), 1..5),
        student in facts(),
    ) {
        let store = RuleGraphStore::in_memory();
        let mut expected = Vec::new();
        for (i, tree) in trees.into_iter().enumerate() {
            let rule = Rule::new(format!("R{i:02}"), "generated", format!("c{i}"), tree).unwrap();
            if rule.evaluate(&student) {
                expected.push(rule.rule_id().to_string());
            }
            store.upsert_rule(&rule).unwrap();
        }

        let actual: Vec<String> = store
            .query_eligibility(&student)
            .unwrap()
            .into_iter()
            .map(|m| m.rule_id)
            .collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn repopulating_keeps_counts(trees in proptest::collection::vec(expr(), 1..5)) {
        let store = RuleGraphStore::in_memory();
        let rules: Vec<Rule> = trees
            .into_iter()
            .enumerate()
            .map(|(i, tree)| Rule::new(format!("R{i}"), "", "done", tree).unwrap())
            .collect();
        for rule in &rules {
            store.upsert_rule(rule).unwrap();
        }
        let once = store.stats().unwrap();
        for rule in &rules {
            store.upsert_rule(rule).unwrap();
        }
        prop_assert_eq!(store.stats().unwrap(), once);
    }
}

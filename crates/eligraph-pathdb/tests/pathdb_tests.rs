use eligraph_pathdb::schema::*;
use eligraph_pathdb::PathDB;
use proptest::prelude::*;

fn small_rule_graph(db: &mut PathDB, rule_id: &str, conclusion: &str, fact: &str) {
    let rule = db.merge_node(LABEL_RULE, PROP_RULE_ID, rule_id).id;
    let conclusion = db.merge_node(LABEL_CONCLUSION, PROP_NAME, conclusion).id;
    let cond = db
        .merge_node(LABEL_CONDITION, PROP_CONDITION_ID, &format!("{rule_id}/{fact}"))
        .id;
    let fact = db.merge_node(LABEL_FACT, PROP_NAME, fact).id;
    db.merge_edge(EDGE_LEADS_TO, rule, conclusion).unwrap();
    db.merge_edge(EDGE_HAS_CONDITION, rule, cond).unwrap();
    db.merge_edge(EDGE_USES_FACT, cond, fact).unwrap();
}

#[test]
fn shared_nodes_are_merged_across_rules() {
    let mut db = PathDB::new();
    small_rule_graph(&mut db, "R1", "eligible", "pct");
    small_rule_graph(&mut db, "R2", "eligible", "pct");

    assert_eq!(db.count_by_label(LABEL_RULE), 2);
    assert_eq!(db.count_by_label(LABEL_CONCLUSION), 1);
    assert_eq!(db.count_by_label(LABEL_FACT), 1);
    assert_eq!(db.count_by_label(LABEL_CONDITION), 2);
    assert_eq!(db.count_by_edge_type(EDGE_USES_FACT), 2);

    let r1 = db.find_node(LABEL_RULE, PROP_RULE_ID, "R1").unwrap();
    let facts = db.follow_path(r1, &[EDGE_HAS_CONDITION, EDGE_USES_FACT]);
    assert_eq!(facts.len(), 1);
    let fact = facts.iter().next().unwrap();
    assert_eq!(db.node_prop(fact, PROP_NAME).as_deref(), Some("pct"));
}

#[test]
fn node_view_resolves_strings() {
    let mut db = PathDB::new();
    let id = db.merge_node(LABEL_RULE, PROP_RULE_ID, "SS_001").id;
    db.set_node_prop(id, PROP_DESCRIPTION, "Engineering (India)")
        .unwrap();

    let view = db.get_node(id).unwrap();
    assert_eq!(view.label, LABEL_RULE);
    assert_eq!(view.props.get(PROP_RULE_ID).map(String::as_str), Some("SS_001"));
    assert_eq!(
        view.props.get(PROP_DESCRIPTION).map(String::as_str),
        Some("Engineering (India)")
    );
}

#[test]
fn every_label_has_a_key() {
    for label in ALL_LABELS {
        assert!(key_property(label).is_some(), "{label} has no merge key");
    }
    assert_eq!(key_property("Student"), None);
}

#[test]
fn edges_to_dead_nodes_are_rejected() {
    let mut db = PathDB::new();
    let a = db.merge_node(LABEL_RULE, PROP_RULE_ID, "R1").id;
    let b = db.merge_node(LABEL_CONCLUSION, PROP_NAME, "x").id;
    db.remove_node(b).unwrap();
    assert!(db.merge_edge(EDGE_LEADS_TO, a, b).is_err());
    assert!(db.merge_edge(EDGE_LEADS_TO, a, 42).is_err());
}

proptest! {
    #[test]
    fn repeated_merges_keep_counts_stable(
        rules in proptest::collection::vec(("[A-Z]{2}_[0-9]{2}", "[a-z]{1,5}", "[a-z]{1,5}"), 1..12)
    ) {
        let mut db = PathDB::new();
        for (r, c, f) in &rules {
            small_rule_graph(&mut db, r, c, f);
        }
        let nodes = db.node_count();
        let edges = db.edge_count();

        for (r, c, f) in &rules {
            small_rule_graph(&mut db, r, c, f);
        }
        prop_assert_eq!(db.node_count(), nodes);
        prop_assert_eq!(db.edge_count(), edges);

        let restored = PathDB::from_bytes(&db.to_bytes().unwrap()).unwrap();
        prop_assert_eq!(restored.node_count(), nodes);
        prop_assert_eq!(restored.edge_count(), edges);
        for (r, _, _) in &rules {
            prop_assert_eq!(
                restored.find_node(LABEL_RULE, PROP_RULE_ID, r),
                db.find_node(LABEL_RULE, PROP_RULE_ID, r)
            );
        }
    }
}

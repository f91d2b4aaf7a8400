//! Per-rule transactions over an exclusively borrowed PathDB.
//!
//! Every mutation is applied immediately and recorded in an undo journal. Commit
//! drops the journal; rollback (explicit, or on drop of an uncommitted
//! transaction) replays it in reverse. The caller holds the store's write lock for
//! the whole lifetime of a transaction, so readers never observe a partial rule.

use eligraph_pathdb::PathDB;

use crate::error::StoreError;

/// Transaction state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Active,
    Committed,
    RolledBack,
}

#[derive(Debug, Clone)]
enum UndoOp {
    CreatedNode(u32),
    CreatedEdge(u32),
    RemovedNode(u32),
    RemovedEdge(u32),
    SetProp {
        node: u32,
        key: String,
        previous: Option<String>,
    },
}

/// A journaled write transaction
pub struct Transaction<'db> {
    db: &'db mut PathDB,
    journal: Vec<UndoOp>,
    state: TxState,
}

impl<'db> Transaction<'db> {
    pub fn begin(db: &'db mut PathDB) -> Self {
        Self {
            db,
            journal: Vec::new(),
            state: TxState::Active,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Read access to the graph as mutated so far.
    pub fn db(&self) -> &PathDB {
        &*self.db
    }

    /// Whether anything has been written.
    pub fn is_dirty(&self) -> bool {
        !self.journal.is_empty()
    }

    /// Merge a node by `(label, key = value)`.
    pub fn merge_node(&mut self, label: &str, key: &str, value: &str) -> (u32, bool) {
        let merged = self.db.merge_node(label, key, value);
        if merged.created {
            self.journal.push(UndoOp::CreatedNode(merged.id));
        }
        (merged.id, merged.created)
    }

    /// Set a property; unchanged values are not journaled.
    pub fn set_prop(&mut self, node: u32, key: &str, value: &str) -> Result<(), StoreError> {
        if self.db.node_prop(node, key).as_deref() == Some(value) {
            return Ok(());
        }
        let previous = self
            .db
            .set_node_prop(node, key, value)
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        self.journal.push(UndoOp::SetProp {
            node,
            key: key.to_string(),
            previous,
        });
        Ok(())
    }

    pub fn merge_edge(
        &mut self,
        edge_type: &str,
        source: u32,
        target: u32,
    ) -> Result<u32, StoreError> {
        let merged = self
            .db
            .merge_edge(edge_type, source, target)
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        if merged.created {
            self.journal.push(UndoOp::CreatedEdge(merged.id));
        }
        Ok(merged.id)
    }

    pub fn remove_edge(&mut self, edge_id: u32) {
        if self.db.remove_edge(edge_id) {
            self.journal.push(UndoOp::RemovedEdge(edge_id));
        }
    }

    /// Remove a node together with every edge touching it.
    pub fn remove_node(&mut self, node: u32) -> Result<(), StoreError> {
        for edge in self.db.incident_edges(node) {
            self.remove_edge(edge);
        }
        let removed = self
            .db
            .remove_node(node)
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        if removed {
            self.journal.push(UndoOp::RemovedNode(node));
        }
        Ok(())
    }

    pub fn commit(mut self) -> usize {
        self.state = TxState::Committed;
        std::mem::take(&mut self.journal).len()
    }

    pub fn rollback(mut self) {
        self.undo();
    }

    fn undo(&mut self) {
        let undone = self.journal.len();
        while let Some(op) = self.journal.pop() {
            match op {
                UndoOp::CreatedEdge(id) => {
                    self.db.remove_edge(id);
                }
                UndoOp::CreatedNode(id) => {
                    if let Err(err) = self.db.remove_node(id) {
                        tracing::error!(node = id, error = %err, "rollback could not remove node");
                    }
                }
                UndoOp::RemovedEdge(id) => {
                    self.db.restore_edge(id);
                }
                UndoOp::RemovedNode(id) => {
                    self.db.restore_node(id);
                }
                UndoOp::SetProp {
                    node,
                    key,
                    previous,
                } => {
                    if let Err(err) = self.db.update_node_prop(node, &key, previous.as_deref()) {
                        tracing::error!(node, error = %err, "rollback could not restore property");
                    }
                }
            }
        }
        self.state = TxState::RolledBack;
        tracing::debug!(undone, "transaction rolled back");
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.state == TxState::Active {
            self.undo();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_restores_previous_graph() {
        let mut db = PathDB::new();
        let rule = db.merge_node("Rule", "rule_id", "R1").id;
        db.set_node_prop(rule, "description", "old").unwrap();
        let old = db.merge_node("Conclusion", "name", "old").id;
        let old_edge = db.merge_edge("LEADS_TO", rule, old).unwrap().id;

        {
            let mut tx = Transaction::begin(&mut db);
            tx.set_prop(rule, "description", "new").unwrap();
            tx.remove_node(old).unwrap();
            let (new, created) = tx.merge_node("Conclusion", "name", "new");
            assert!(created);
            tx.merge_edge("LEADS_TO", rule, new).unwrap();
            tx.rollback();
        }

        assert_eq!(db.node_prop(rule, "description").as_deref(), Some("old"));
        assert_eq!(db.find_node("Conclusion", "name", "old"), Some(old));
        assert_eq!(db.find_node("Conclusion", "name", "new"), None);
        assert!(db.edges.is_live(old_edge));
        assert_eq!(db.node_count(), 2);
        assert_eq!(db.edge_count(), 1);
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let mut db = PathDB::new();
        {
            let mut tx = Transaction::begin(&mut db);
            tx.merge_node("Fact", "name", "pct");
        }
        assert_eq!(db.node_count(), 0);
    }

    #[test]
    fn commit_keeps_writes() {
        let mut db = PathDB::new();
        let mut tx = Transaction::begin(&mut db);
        let (id, _) = tx.merge_node("Fact", "name", "pct");
        tx.set_prop(id, "name", "pct").unwrap();
        assert_eq!(tx.commit(), 1, "unchanged property is not journaled");
        assert_eq!(db.node_count(), 1);
    }
}

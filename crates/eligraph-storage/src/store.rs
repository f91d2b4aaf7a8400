use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eligraph_pathdb::schema::*;
use eligraph_pathdb::PathDB;
use eligraph_rules::{Facts, Rule};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::eval::{self, EligibilityMatch};
use crate::transaction::Transaction;
use crate::writer;

/// What an upsert did to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertOutcome {
    /// The rule id was new
    Inserted,
    /// The rule existed and its description, conclusion or conditions changed
    Updated,
    /// The rule existed with identical content; nothing was written
    Unchanged,
}

/// Live element counts of the rule graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub nodes_by_label: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

/// Shared handle to the eligibility rule graph.
///
/// Clones share one graph. Writers hold the write lock for a whole rule, readers
/// the read lock for a whole query, so a rule is visible either completely or not
/// at all.
#[derive(Clone)]
pub struct RuleGraphStore {
    config: StoreConfig,
    pathdb: Arc<RwLock<PathDB>>,
    closed: Arc<AtomicBool>,
}

impl std::fmt::Debug for RuleGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleGraphStore")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl RuleGraphStore {
    /// Open a store. A file-backed store loads its snapshot when the file exists.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let pathdb = match &config.path {
            Some(path) if path.exists() => load_snapshot(path)?,
            _ => PathDB::new(),
        };

        tracing::info!(
            path = ?config.path,
            nodes = pathdb.node_count(),
            edges = pathdb.edge_count(),
            "opened rule graph store"
        );

        Ok(Self {
            config,
            pathdb: Arc::new(RwLock::new(pathdb)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A fresh in-memory store with default settings.
    pub fn in_memory() -> Self {
        Self {
            config: StoreConfig::in_memory(),
            pathdb: Arc::new(RwLock::new(PathDB::new())),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Close the store for every clone of this handle.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(path = ?self.config.path, "closed rule graph store");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Underlying graph, for diagnostics and tooling.
    pub fn pathdb(&self) -> Arc<RwLock<PathDB>> {
        Arc::clone(&self.pathdb)
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::unavailable("store is closed"));
        }
        Ok(())
    }

    fn read_session(&self) -> Result<RwLockReadGuard<'_, PathDB>, StoreError> {
        self.ensure_open()?;
        self.pathdb
            .try_read_for(self.config.lock_timeout)
            .ok_or_else(|| {
                StoreError::unavailable(format!(
                    "timed out after {:?} waiting for a read session",
                    self.config.lock_timeout
                ))
            })
    }

    fn write_session(&self) -> Result<RwLockWriteGuard<'_, PathDB>, StoreError> {
        self.ensure_open()?;
        self.pathdb
            .try_write_for(self.config.lock_timeout)
            .ok_or_else(|| {
                StoreError::unavailable(format!(
                    "timed out after {:?} waiting for a write session",
                    self.config.lock_timeout
                ))
            })
    }

    fn persist(&self, db: &PathDB) -> Result<(), StoreError> {
        let Some(path) = &self.config.path else {
            return Ok(());
        };
        let bytes = db
            .to_bytes()
            .map_err(|e| StoreError::snapshot(path.clone(), e))?;
        write_atomic(path, &bytes).map_err(|e| StoreError::snapshot(path.clone(), e))
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Delete every node and edge. Returns how many live elements were removed.
    pub fn clear_all(&self) -> Result<usize, StoreError> {
        let mut db = self.write_session()?;
        self.persist(&PathDB::new())?;
        let deleted = db.clear();
        tracing::info!(deleted, "cleared rule graph");
        Ok(deleted)
    }

    /// Merge a rule, its conclusion and its whole condition tree in one transaction.
    pub fn upsert_rule(&self, rule: &Rule) -> Result<UpsertOutcome, StoreError> {
        let mut db = self.write_session()?;
        let mut tx = Transaction::begin(&mut db);

        let created = match writer::write_rule(&mut tx, rule) {
            Ok((_, created)) => created,
            Err(err) => {
                tx.rollback();
                return Err(err);
            }
        };

        if !tx.is_dirty() {
            tx.commit();
            return Ok(UpsertOutcome::Unchanged);
        }

        if let Err(err) = self.persist(tx.db()) {
            tx.rollback();
            tracing::warn!(rule_id = rule.rule_id(), error = %err, "rolled back rule upsert");
            return Err(err);
        }

        let writes = tx.commit();
        tracing::debug!(rule_id = rule.rule_id(), writes, created, "upserted rule");

        Ok(if created {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    // ========================================================================
    // Read Operations
    // ========================================================================

    /// Every stored rule whose condition tree holds for `facts`, sorted by rule id.
    pub fn query_eligibility(&self, facts: &Facts) -> Result<Vec<EligibilityMatch>, StoreError> {
        let db = self.read_session()?;
        Ok(eval::matching_rules(&db, facts))
    }

    pub fn stats(&self) -> Result<GraphStats, StoreError> {
        let db = self.read_session()?;
        Ok(GraphStats {
            nodes: db.node_count(),
            edges: db.edge_count(),
            nodes_by_label: ALL_LABELS
                .iter()
                .map(|label| (label.to_string(), db.count_by_label(label)))
                .collect(),
            edges_by_type: ALL_EDGE_TYPES
                .iter()
                .map(|edge_type| (edge_type.to_string(), db.count_by_edge_type(edge_type)))
                .collect(),
        })
    }

    /// Stored rule ids, sorted.
    pub fn rule_ids(&self) -> Result<Vec<String>, StoreError> {
        let db = self.read_session()?;
        let mut ids: Vec<String> = db
            .find_by_label(LABEL_RULE)
            .iter()
            .filter_map(|node| db.node_prop(node, PROP_RULE_ID))
            .collect();
        ids.sort();
        Ok(ids)
    }
}

fn load_snapshot(path: &Path) -> Result<PathDB, StoreError> {
    let bytes = std::fs::read(path).map_err(|e| StoreError::snapshot(path, e))?;
    PathDB::from_bytes(&bytes).map_err(|e| StoreError::snapshot(path, e))
}

/// Write via a sibling temp file and rename, so a crash never leaves a torn snapshot.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

//! PathDB: Interned, Labeled Property Graph Storage
//!
//! The substrate under the eligibility rule graph:
//!
//! 1. **String Interning**: labels, property names and values stored once,
//!    referenced by `u32` ids
//! 2. **Labeled Nodes**: one label per node, string properties stored column-wise,
//!    label membership as Roaring bitmaps
//! 3. **Merge by Key**: `(label, key property, value)` uniquely identifies a node, so
//!    re-adding the same identity returns the existing node
//! 4. **Merge by Endpoints**: `(source, type, target)` edges are never duplicated
//! 5. **Tombstones**: deletes clear liveness bits but keep the slot, so a deleted
//!    node or edge can be restored by an aborting transaction
//! 6. **Snapshots**: versioned binary format with a SHA-256 payload checksum
//!
//! PathDB itself is single-threaded; callers share it behind a lock.

pub mod schema;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// String Interning (Compact String Storage)
// ============================================================================

/// Interned string ID (4 bytes instead of 24+ for String)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StrId(u32);

impl StrId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// String interner: maps strings to compact IDs
pub struct StringInterner {
    /// String to ID mapping
    str_to_id: DashMap<String, StrId>,
    /// ID to string mapping (for reverse lookup)
    id_to_str: DashMap<StrId, String>,
    /// Next available ID
    next_id: AtomicU32,
}

impl StringInterner {
    pub fn new() -> Self {
        Self {
            str_to_id: DashMap::new(),
            id_to_str: DashMap::new(),
            next_id: AtomicU32::new(0),
        }
    }

    /// Intern a string, returning its ID
    pub fn intern(&self, s: &str) -> StrId {
        if let Some(id) = self.str_to_id.get(s) {
            return *id;
        }

        let id = StrId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.str_to_id.insert(s.to_string(), id);
        self.id_to_str.insert(id, s.to_string());
        id
    }

    /// Look up an existing ID for a string without inserting.
    pub fn id_of(&self, s: &str) -> Option<StrId> {
        self.str_to_id.get(s).map(|id| *id)
    }

    /// Look up string by ID
    pub fn lookup(&self, id: StrId) -> Option<String> {
        self.id_to_str.get(&id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::SeqCst) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All interned strings in id order.
    fn strings(&self) -> Vec<String> {
        (0..self.next_id.load(Ordering::SeqCst))
            .filter_map(|i| self.id_to_str.get(&StrId(i)).map(|s| s.clone()))
            .collect()
    }

    fn from_strings(strings: Vec<String>) -> Self {
        let interner = Self::new();
        for s in strings {
            interner.intern(&s);
        }
        interner
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Node Storage (Columnar)
// ============================================================================

/// `(label, key property, key value)`: the merge identity of a node.
pub type NodeKey = (StrId, StrId, StrId);

/// Debug/FFI-friendly node view with resolved strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: u32,
    pub label: String,
    pub props: HashMap<String, String>,
}

/// Columnar node storage
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct NodeStore {
    /// Label column: node_id -> label
    labels: Vec<StrId>,
    /// Property columns: prop_name -> (node_id -> value)
    props: HashMap<StrId, HashMap<u32, StrId>>,
    /// Label index: label -> bitmap of live node IDs
    label_index: HashMap<StrId, RoaringBitmap>,
    /// Merge index: (label, key, value) -> live node ID
    key_index: HashMap<NodeKey, u32>,
    /// Keys registered per node (kept across tombstoning for restore)
    keys_by_node: HashMap<u32, Vec<NodeKey>>,
    /// Live node IDs
    live: RoaringBitmap,
}

impl NodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Total slots ever allocated (live + tombstoned).
    pub fn capacity(&self) -> usize {
        self.labels.len()
    }

    pub fn is_live(&self, node_id: u32) -> bool {
        self.live.contains(node_id)
    }

    pub fn live(&self) -> &RoaringBitmap {
        &self.live
    }

    /// Add a node
    pub fn add(&mut self, label: StrId, props: Vec<(StrId, StrId)>) -> u32 {
        let id = self.labels.len() as u32;
        self.labels.push(label);

        self.label_index
            .entry(label)
            .or_insert_with(RoaringBitmap::new)
            .insert(id);

        for (name, value) in props {
            self.props
                .entry(name)
                .or_insert_with(HashMap::new)
                .insert(id, value);
        }

        self.live.insert(id);
        id
    }

    /// Register a merge key for a live node.
    pub fn register_key(&mut self, node_id: u32, key: NodeKey) {
        self.key_index.insert(key, node_id);
        self.keys_by_node.entry(node_id).or_default().push(key);
    }

    pub fn find_by_key(&self, key: &NodeKey) -> Option<u32> {
        self.key_index
            .get(key)
            .copied()
            .filter(|id| self.live.contains(*id))
    }

    /// Tombstone a node. Returns false if it was not live.
    pub fn remove(&mut self, node_id: u32) -> bool {
        if !self.live.remove(node_id) {
            return false;
        }
        if let Some(label) = self.labels.get(node_id as usize) {
            if let Some(bitmap) = self.label_index.get_mut(label) {
                bitmap.remove(node_id);
            }
        }
        if let Some(keys) = self.keys_by_node.get(&node_id) {
            for key in keys {
                if self.key_index.get(key) == Some(&node_id) {
                    self.key_index.remove(key);
                }
            }
        }
        true
    }

    /// Bring a tombstoned node back. Returns false if it was live or never existed.
    pub fn restore(&mut self, node_id: u32) -> bool {
        let Some(label) = self.labels.get(node_id as usize).copied() else {
            return false;
        };
        if !self.live.insert(node_id) {
            return false;
        }
        self.label_index
            .entry(label)
            .or_insert_with(RoaringBitmap::new)
            .insert(node_id);
        if let Some(keys) = self.keys_by_node.get(&node_id) {
            for key in keys {
                self.key_index.insert(*key, node_id);
            }
        }
        true
    }

    /// Live nodes with a label
    pub fn by_label(&self, label: StrId) -> Option<&RoaringBitmap> {
        self.label_index.get(&label)
    }

    /// Label of a live node
    pub fn get_label(&self, node_id: u32) -> Option<StrId> {
        if !self.live.contains(node_id) {
            return None;
        }
        self.labels.get(node_id as usize).copied()
    }

    /// Property value of a live node
    pub fn get_prop(&self, node_id: u32, name: StrId) -> Option<StrId> {
        if !self.live.contains(node_id) {
            return None;
        }
        self.props.get(&name)?.get(&node_id).copied()
    }

    /// Set (or unset with `None`) a property, returning the previous value.
    pub fn set_prop(&mut self, node_id: u32, name: StrId, value: Option<StrId>) -> Option<StrId> {
        match value {
            Some(value) => self
                .props
                .entry(name)
                .or_insert_with(HashMap::new)
                .insert(node_id, value),
            None => self.props.get_mut(&name)?.remove(&node_id),
        }
    }
}

// ============================================================================
// Edge Storage (Edge-List with Indexes)
// ============================================================================

/// A directed, typed edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub edge_type: StrId,
    pub source: u32,
    pub target: u32,
}

/// Indexed edge storage
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EdgeStore {
    /// All edges ever added (tombstoned ones included)
    edges: Vec<Edge>,
    /// Forward index: (source, edge_type) -> live edge IDs
    forward_index: HashMap<(u32, StrId), Vec<u32>>,
    /// Backward index: (target, edge_type) -> live edge IDs
    backward_index: HashMap<(u32, StrId), Vec<u32>>,
    /// Type index: edge_type -> live edge IDs
    type_index: HashMap<StrId, RoaringBitmap>,
    /// Live edge IDs
    live: RoaringBitmap,
}

impl EdgeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live edges.
    pub fn len(&self) -> usize {
        self.live.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of live edges of a given type.
    pub fn type_count(&self, edge_type: StrId) -> usize {
        self.type_index
            .get(&edge_type)
            .map(|ids| ids.len() as usize)
            .unwrap_or(0)
    }

    pub fn is_live(&self, edge_id: u32) -> bool {
        self.live.contains(edge_id)
    }

    /// Add an edge
    pub fn add(&mut self, edge: Edge) -> u32 {
        let id = self.edges.len() as u32;
        self.edges.push(edge);
        self.index(id, edge);
        id
    }

    fn index(&mut self, id: u32, edge: Edge) {
        self.forward_index
            .entry((edge.source, edge.edge_type))
            .or_insert_with(Vec::new)
            .push(id);

        self.backward_index
            .entry((edge.target, edge.edge_type))
            .or_insert_with(Vec::new)
            .push(id);

        self.type_index
            .entry(edge.edge_type)
            .or_insert_with(RoaringBitmap::new)
            .insert(id);

        self.live.insert(id);
    }

    /// Tombstone an edge. Returns false if it was not live.
    pub fn remove(&mut self, edge_id: u32) -> bool {
        if !self.live.remove(edge_id) {
            return false;
        }
        let Some(edge) = self.edges.get(edge_id as usize).copied() else {
            return false;
        };
        if let Some(ids) = self.forward_index.get_mut(&(edge.source, edge.edge_type)) {
            ids.retain(|&id| id != edge_id);
        }
        if let Some(ids) = self.backward_index.get_mut(&(edge.target, edge.edge_type)) {
            ids.retain(|&id| id != edge_id);
        }
        if let Some(ids) = self.type_index.get_mut(&edge.edge_type) {
            ids.remove(edge_id);
        }
        true
    }

    /// Bring a tombstoned edge back.
    pub fn restore(&mut self, edge_id: u32) -> bool {
        if self.live.contains(edge_id) {
            return false;
        }
        let Some(edge) = self.edges.get(edge_id as usize).copied() else {
            return false;
        };
        self.index(edge_id, edge);
        true
    }

    /// Get a live edge by id.
    pub fn get(&self, edge_id: u32) -> Option<&Edge> {
        if !self.live.contains(edge_id) {
            return None;
        }
        self.edges.get(edge_id as usize)
    }

    /// The live edge `source -[edge_type]-> target`, if present.
    pub fn find(&self, source: u32, edge_type: StrId, target: u32) -> Option<u32> {
        let ids = self.forward_index.get(&(source, edge_type))?;
        ids.iter()
            .copied()
            .find(|&id| self.edges.get(id as usize).is_some_and(|e| e.target == target))
    }

    /// Get all targets reachable from source via edge_type
    pub fn targets(&self, source: u32, edge_type: StrId) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        if let Some(ids) = self.forward_index.get(&(source, edge_type)) {
            for &id in ids {
                if let Some(edge) = self.edges.get(id as usize) {
                    result.insert(edge.target);
                }
            }
        }
        result
    }

    /// Get all sources that reach `target` via `edge_type`.
    pub fn sources(&self, target: u32, edge_type: StrId) -> RoaringBitmap {
        let mut result = RoaringBitmap::new();
        if let Some(ids) = self.backward_index.get(&(target, edge_type)) {
            for &id in ids {
                if let Some(edge) = self.edges.get(id as usize) {
                    result.insert(edge.source);
                }
            }
        }
        result
    }

    /// Live edge ids touching `node` in either direction (any type), sorted.
    pub fn incident(&self, node: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self
            .forward_index
            .iter()
            .filter(|((src, _), _)| *src == node)
            .chain(
                self.backward_index
                    .iter()
                    .filter(|((dst, _), _)| *dst == node),
            )
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

// ============================================================================
// PathDB: The Complete Database
// ============================================================================

/// Result of a merge: the node/edge id and whether it was newly created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merged {
    pub id: u32,
    pub created: bool,
}

/// PathDB: interned, labeled property graph
pub struct PathDB {
    /// String interner for compact storage
    pub interner: StringInterner,
    /// Node storage
    pub nodes: NodeStore,
    /// Edge storage
    pub edges: EdgeStore,
}

impl PathDB {
    pub fn new() -> Self {
        Self {
            interner: StringInterner::new(),
            nodes: NodeStore::new(),
            edges: EdgeStore::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ========================================================================
    // Write Operations
    // ========================================================================

    /// Add a node without merge semantics.
    pub fn add_node(&mut self, label: &str, props: Vec<(&str, &str)>) -> u32 {
        let label_id = self.interner.intern(label);
        let interned: Vec<(StrId, StrId)> = props
            .into_iter()
            .map(|(k, v)| (self.interner.intern(k), self.interner.intern(v)))
            .collect();
        self.nodes.add(label_id, interned)
    }

    /// Return the live node identified by `(label, key = value)`, creating it (with
    /// that key property set) if absent.
    pub fn merge_node(&mut self, label: &str, key: &str, value: &str) -> Merged {
        let identity = (
            self.interner.intern(label),
            self.interner.intern(key),
            self.interner.intern(value),
        );
        if let Some(id) = self.nodes.find_by_key(&identity) {
            return Merged { id, created: false };
        }
        let id = self.nodes.add(identity.0, vec![(identity.1, identity.2)]);
        self.nodes.register_key(id, identity);
        Merged { id, created: true }
    }

    /// Set a property on a live node, returning the previous value.
    pub fn set_node_prop(
        &mut self,
        node_id: u32,
        key: &str,
        value: &str,
    ) -> Result<Option<String>> {
        self.update_node_prop(node_id, key, Some(value))
    }

    /// Set (`Some`) or unset (`None`) a property on a live node, returning the
    /// previous value.
    pub fn update_node_prop(
        &mut self,
        node_id: u32,
        key: &str,
        value: Option<&str>,
    ) -> Result<Option<String>> {
        if !self.nodes.is_live(node_id) {
            return Err(anyhow!("unknown node id {node_id}"));
        }
        let key_id = self.interner.intern(key);
        let value_id = value.map(|v| self.interner.intern(v));
        let previous = self.nodes.set_prop(node_id, key_id, value_id);
        Ok(previous.and_then(|id| self.interner.lookup(id)))
    }

    /// Return the live edge `source -[edge_type]-> target`, creating it if absent.
    pub fn merge_edge(&mut self, edge_type: &str, source: u32, target: u32) -> Result<Merged> {
        if !self.nodes.is_live(source) {
            return Err(anyhow!("edge {edge_type}: unknown source node {source}"));
        }
        if !self.nodes.is_live(target) {
            return Err(anyhow!("edge {edge_type}: unknown target node {target}"));
        }
        let type_id = self.interner.intern(edge_type);
        if let Some(id) = self.edges.find(source, type_id, target) {
            return Ok(Merged { id, created: false });
        }
        let id = self.edges.add(Edge {
            edge_type: type_id,
            source,
            target,
        });
        Ok(Merged { id, created: true })
    }

    /// Tombstone a live edge.
    pub fn remove_edge(&mut self, edge_id: u32) -> bool {
        self.edges.remove(edge_id)
    }

    pub fn restore_edge(&mut self, edge_id: u32) -> bool {
        let Some(edge) = self.edges.edges.get(edge_id as usize).copied() else {
            return false;
        };
        if !self.nodes.is_live(edge.source) || !self.nodes.is_live(edge.target) {
            return false;
        }
        self.edges.restore(edge_id)
    }

    /// Tombstone a node. Fails if live edges still touch it (detach first).
    pub fn remove_node(&mut self, node_id: u32) -> Result<bool> {
        if !self.edges.incident(node_id).is_empty() {
            return Err(anyhow!("node {node_id} still has live edges"));
        }
        Ok(self.nodes.remove(node_id))
    }

    /// Bring a tombstoned node back, unless its merge key was claimed meanwhile.
    pub fn restore_node(&mut self, node_id: u32) -> bool {
        self.nodes.restore(node_id)
    }

    /// Live edges touching a node.
    pub fn incident_edges(&self, node_id: u32) -> Vec<u32> {
        self.edges.incident(node_id)
    }

    /// Delete every node and edge. Returns the number of live elements removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.nodes.len() + self.edges.len();
        self.nodes = NodeStore::new();
        self.edges = EdgeStore::new();
        removed
    }

    // ========================================================================
    // Query Operations
    // ========================================================================

    /// Live node with `(label, key = value)`
    pub fn find_node(&self, label: &str, key: &str, value: &str) -> Option<u32> {
        let identity = (
            self.interner.id_of(label)?,
            self.interner.id_of(key)?,
            self.interner.id_of(value)?,
        );
        self.nodes.find_by_key(&identity)
    }

    /// Live nodes with a label (bitmap result for efficient joins)
    pub fn find_by_label(&self, label: &str) -> RoaringBitmap {
        self.interner
            .id_of(label)
            .and_then(|id| self.nodes.by_label(id))
            .cloned()
            .unwrap_or_default()
    }

    pub fn count_by_label(&self, label: &str) -> usize {
        self.interner
            .id_of(label)
            .and_then(|id| self.nodes.by_label(id))
            .map(|b| b.len() as usize)
            .unwrap_or(0)
    }

    pub fn count_by_edge_type(&self, edge_type: &str) -> usize {
        self.interner
            .id_of(edge_type)
            .map(|id| self.edges.type_count(id))
            .unwrap_or(0)
    }

    pub fn node_label(&self, node_id: u32) -> Option<String> {
        let label = self.nodes.get_label(node_id)?;
        self.interner.lookup(label)
    }

    pub fn node_prop(&self, node_id: u32, key: &str) -> Option<String> {
        let key_id = self.interner.id_of(key)?;
        let value = self.nodes.get_prop(node_id, key_id)?;
        self.interner.lookup(value)
    }

    /// Resolve a node into human-readable strings (label + properties).
    pub fn get_node(&self, node_id: u32) -> Option<NodeView> {
        let label = self.node_label(node_id)?;
        let mut props = HashMap::new();
        for (name_id, col) in &self.nodes.props {
            if let Some(value_id) = col.get(&node_id) {
                let (Some(name), Some(value)) =
                    (self.interner.lookup(*name_id), self.interner.lookup(*value_id))
                else {
                    continue;
                };
                props.insert(name, value);
            }
        }
        Some(NodeView {
            id: node_id,
            label,
            props,
        })
    }

    /// Follow a single edge type from source
    pub fn follow(&self, source: u32, edge_type: &str) -> RoaringBitmap {
        let Some(type_id) = self.interner.id_of(edge_type) else {
            return RoaringBitmap::new();
        };
        self.edges.targets(source, type_id)
    }

    /// Follow a single edge type backwards from target
    pub fn follow_back(&self, target: u32, edge_type: &str) -> RoaringBitmap {
        let Some(type_id) = self.interner.id_of(edge_type) else {
            return RoaringBitmap::new();
        };
        self.edges.sources(target, type_id)
    }

    /// Follow a path of edge types
    pub fn follow_path(&self, start: u32, path: &[&str]) -> RoaringBitmap {
        let mut current = RoaringBitmap::new();
        current.insert(start);

        for edge_type in path {
            let Some(type_id) = self.interner.id_of(edge_type) else {
                return RoaringBitmap::new();
            };
            let mut next = RoaringBitmap::new();
            for node in current.iter() {
                next |= self.edges.targets(node, type_id);
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        current
    }

    /// Live edge id of `source -[edge_type]-> target`
    pub fn find_edge(&self, source: u32, edge_type: &str, target: u32) -> Option<u32> {
        let type_id = self.interner.id_of(edge_type)?;
        self.edges.find(source, type_id, target)
    }

    pub fn has_edge(&self, source: u32, edge_type: &str, target: u32) -> bool {
        self.find_edge(source, edge_type, target).is_some()
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize to the versioned snapshot format.
    ///
    /// Layout: `ELPD` | version (u32 LE) | SHA-256 of payload (32 bytes) |
    /// payload length (u64 LE) | payload (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(&(self.interner.strings(), &self.nodes, &self.edges))?;
        let checksum: [u8; 32] = Sha256::digest(&payload).into();

        let mut result = Vec::with_capacity(SNAPSHOT_HEADER_LEN + payload.len());
        result.extend_from_slice(SNAPSHOT_MAGIC);
        result.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        result.extend_from_slice(&checksum);
        result.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        result.extend_from_slice(&payload);
        Ok(result)
    }

    /// Deserialize from the snapshot format, verifying version and checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SNAPSHOT_HEADER_LEN || &bytes[0..4] != SNAPSHOT_MAGIC {
            return Err(anyhow!("Invalid PathDB snapshot"));
        }

        let version = u32::from_le_bytes(bytes[4..8].try_into()?);
        if version != SNAPSHOT_VERSION {
            return Err(anyhow!("Unsupported PathDB snapshot version: {}", version));
        }

        let checksum = &bytes[8..40];
        let payload_len = u64::from_le_bytes(bytes[40..48].try_into()?);
        let payload = usize::try_from(payload_len)
            .ok()
            .and_then(|len| SNAPSHOT_HEADER_LEN.checked_add(len))
            .and_then(|end| bytes.get(SNAPSHOT_HEADER_LEN..end))
            .ok_or_else(|| anyhow!("Truncated PathDB snapshot"))?;
        let actual: [u8; 32] = Sha256::digest(payload).into();
        if actual.as_slice() != checksum {
            return Err(anyhow!("PathDB snapshot checksum mismatch"));
        }

        let (strings, nodes, edges): (Vec<String>, NodeStore, EdgeStore) =
            bincode::deserialize(payload)?;

        Ok(Self {
            interner: StringInterner::from_strings(strings),
            nodes,
            edges,
        })
    }
}

const SNAPSHOT_MAGIC: &[u8; 4] = b"ELPD";
const SNAPSHOT_VERSION: u32 = 1;
const SNAPSHOT_HEADER_LEN: usize = 4 + 4 + 32 + 8;

impl Default for PathDB {
    fn default() -> Self {
        Self::new()
    }
}

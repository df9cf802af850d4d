//! Cluster Manager
//!
//! Node registry, slot assignment, ownership lookup, and per-node stats.

use std::collections::HashMap;

use rand::RngCore;
use tracing::info;

use super::node::{Node, NodeId, SlotRange};
use super::slot::SLOT_COUNT;

/// Coordinates cluster topology for one server process.
///
/// Slots stay unassigned until the node count first reaches three; at that
/// point the slot space is partitioned evenly across the members in
/// sorted-id order, so every node computes the same assignment.
#[derive(Debug)]
pub struct ClusterManager {
    nodes: HashMap<NodeId, Node>,
    self_id: NodeId,
}

impl ClusterManager {
    /// Create a manager for a standalone node with an unassigned slot range
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let self_id = generate_node_id();
        let node = Node::new(self_id.clone(), host, port);

        let mut nodes = HashMap::new();
        nodes.insert(self_id.clone(), node);

        Self { nodes, self_id }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// This server's node identity within the cluster
    pub fn self_node(&self) -> &Node {
        &self.nodes[&self.self_id]
    }

    fn self_node_mut(&mut self) -> &mut Node {
        self.nodes
            .get_mut(&self.self_id)
            .expect("self node is always registered")
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Whether slot ownership is enforced (cluster has formed)
    pub fn routed(&self) -> bool {
        self.nodes.len() >= 3
    }

    /// Register a new node under a fresh id.
    ///
    /// Duplicate (host, port) pairs are allowed and get distinct ids. When
    /// the count first reaches three the cluster initializes itself.
    pub fn add_node(&mut self, host: impl Into<String>, port: u16) -> NodeId {
        let id = generate_node_id();
        self.nodes.insert(id.clone(), Node::new(id.clone(), host, port));

        if self.nodes.len() == 3 {
            self.initialize();
        }

        id
    }

    /// Partition the slot space evenly across all registered nodes.
    ///
    /// Ids are sorted first so the assignment is deterministic; the last
    /// node absorbs the remainder so the union covers every slot.
    pub fn initialize(&mut self) {
        let mut ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        ids.sort();

        let per_node = SLOT_COUNT / ids.len() as u16;

        for (i, id) in ids.iter().enumerate() {
            let start = i as u16 * per_node;
            let end = if i == ids.len() - 1 {
                SLOT_COUNT - 1
            } else {
                start + per_node - 1
            };

            if let Some(node) = self.nodes.get_mut(id) {
                node.slots = Some(SlotRange::new(start, end));
            }
        }

        info!(nodes = ids.len(), "cluster initialized, slots assigned");
    }

    /// Find the node responsible for a slot.
    ///
    /// Below three nodes every slot is served locally. Once routed, any
    /// slot outside the assigned ranges falls back to self rather than
    /// leaving the request unroutable.
    pub fn owner(&self, slot: u16) -> &Node {
        if self.nodes.len() < 3 {
            return self.self_node();
        }

        self.nodes
            .values()
            .find(|node| node.owns_slot(slot))
            .unwrap_or_else(|| self.self_node())
    }

    /// Record a key added to this node
    pub fn incr_keys(&mut self) {
        self.self_node_mut().key_count += 1;
    }

    /// Record a key removed from this node
    pub fn decr_keys(&mut self) {
        let node = self.self_node_mut();
        node.key_count = node.key_count.saturating_sub(1);
    }

    /// Record stored bytes added to this node
    pub fn add_bytes(&mut self, key_len: usize, value_len: usize) {
        self.self_node_mut().byte_size += (key_len + value_len) as u64;
    }

    /// Record stored bytes removed from this node
    pub fn sub_bytes(&mut self, key_len: usize, value_len: usize) {
        let node = self.self_node_mut();
        node.byte_size = node.byte_size.saturating_sub((key_len + value_len) as u64);
    }

    /// Overwrite this node's counters with authoritative store totals
    pub fn set_self_stats(&mut self, key_count: u64, byte_size: u64) {
        let node = self.self_node_mut();
        node.key_count = key_count;
        node.byte_size = byte_size;
    }
}

fn generate_node_id() -> NodeId {
    let mut raw = [0u8; 20];
    rand::rng().fill_bytes(&mut raw);
    raw.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registers_self() {
        let manager = ClusterManager::new("127.0.0.1", 6379);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.self_node().id, manager.self_id());
        assert_eq!(manager.self_node().id.len(), 40);
        assert!(manager.self_node().slots.is_none());
    }

    #[test]
    fn test_single_node_owns_everything() {
        let manager = ClusterManager::new("127.0.0.1", 6379);
        assert!(!manager.routed());
        assert_eq!(manager.owner(0).id, manager.self_id());
        assert_eq!(manager.owner(SLOT_COUNT - 1).id, manager.self_id());
    }

    #[test]
    fn test_third_node_triggers_initialization() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);
        manager.add_node("127.0.0.1", 6380);
        assert!(!manager.routed());
        assert!(manager.nodes().all(|n| n.slots.is_none()));

        manager.add_node("127.0.0.1", 6381);
        assert!(manager.routed());
        assert!(manager.nodes().all(|n| n.slots.is_some()));
    }

    #[test]
    fn test_slots_partition_exactly() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);
        manager.add_node("127.0.0.1", 6380);
        manager.add_node("127.0.0.1", 6381);

        let mut ranges: Vec<SlotRange> =
            manager.nodes().map(|n| n.slots.unwrap()).collect();
        ranges.sort_by_key(|r| r.start);

        // Contiguous, disjoint, and total over [0, 16384)
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges[2].end, SLOT_COUNT - 1);
        assert_eq!(ranges[0].end + 1, ranges[1].start);
        assert_eq!(ranges[1].end + 1, ranges[2].start);

        let total: u32 = ranges.iter().map(|r| r.count() as u32).sum();
        assert_eq!(total, SLOT_COUNT as u32);

        // Every slot has exactly one owner
        for slot in [0, 5460, 5461, 10921, 10922, SLOT_COUNT - 1] {
            let owners = manager.nodes().filter(|n| n.owns_slot(slot)).count();
            assert_eq!(owners, 1, "slot {slot} should have one owner");
        }
    }

    #[test]
    fn test_assignment_follows_sorted_ids() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);
        manager.add_node("127.0.0.1", 6380);
        manager.add_node("127.0.0.1", 6381);

        let mut ids: Vec<NodeId> = manager.nodes().map(|n| n.id.clone()).collect();
        ids.sort();

        let mut ranges: Vec<(NodeId, SlotRange)> = manager
            .nodes()
            .map(|n| (n.id.clone(), n.slots.unwrap()))
            .collect();
        ranges.sort_by_key(|(_, r)| r.start);

        let ordered: Vec<NodeId> = ranges.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ordered, ids);
    }

    #[test]
    fn test_fourth_node_stays_unassigned() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);
        manager.add_node("127.0.0.1", 6380);
        manager.add_node("127.0.0.1", 6381);
        let fourth = manager.add_node("127.0.0.1", 6382);

        let node = manager.nodes().find(|n| n.id == fourth).unwrap();
        assert!(node.slots.is_none());

        // Assigned ranges still resolve to their owners
        let owners: Vec<_> = (0..SLOT_COUNT).map(|s| manager.owner(s).id.clone()).collect();
        assert!(owners.iter().all(|id| *id != fourth));
    }

    #[test]
    fn test_duplicate_endpoint_gets_fresh_id() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);
        let a = manager.add_node("10.0.0.5", 7000);
        let b = manager.add_node("10.0.0.5", 7000);
        assert_ne!(a, b);
        assert_eq!(manager.len(), 3);
    }

    #[test]
    fn test_stats_counters_saturate() {
        let mut manager = ClusterManager::new("127.0.0.1", 6379);

        manager.decr_keys();
        assert_eq!(manager.self_node().key_count, 0);

        manager.incr_keys();
        manager.add_bytes(3, 5);
        assert_eq!(manager.self_node().key_count, 1);
        assert_eq!(manager.self_node().byte_size, 8);

        manager.sub_bytes(100, 100);
        assert_eq!(manager.self_node().byte_size, 0);
    }
}

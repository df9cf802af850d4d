//! Hub Message Types
//!
//! JSON wire shapes shared by the WebSocket channel and the broadcast path.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cluster::Node;

/// Client request arriving over the WebSocket channel
#[derive(Debug, Clone, Deserialize)]
pub struct CommandMessage {
    pub action: String,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Store change notification fanned out to all subscribers
#[derive(Debug, Clone, Serialize)]
pub struct UpdateMessage {
    pub action: String,
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// Full key-value snapshot sent in response to `get_all`
#[derive(Debug, Clone, Serialize)]
pub struct SyncMessage {
    pub action: String,
    pub data: HashMap<String, String>,
}

/// Per-node statistics row
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStats {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub slot_start: i32,
    pub slot_end: i32,
    pub key_count: u64,
    pub byte_size: u64,
}

impl NodeStats {
    /// Unassigned ranges are reported as `slotStart = slotEnd = -1`
    pub fn from_node(node: &Node) -> Self {
        let (slot_start, slot_end) = match node.slots {
            Some(range) => (range.start as i32, range.end as i32),
            None => (-1, -1),
        };

        Self {
            id: node.id.clone(),
            host: node.host.clone(),
            port: node.port,
            slot_start,
            slot_end,
            key_count: node.key_count,
            byte_size: node.byte_size,
        }
    }
}

/// Cluster topology reply for `cluster_info` requests
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfoMessage {
    pub action: String,
    pub nodes: Vec<NodeStats>,
    pub current_node_id: String,
    pub total_slots: u32,
    pub cluster_size: usize,
}

/// Cluster-wide statistics snapshot broadcast after mutations
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatsMessage {
    pub action: String,
    pub nodes: Vec<NodeStats>,
    pub current_node_id: String,
    pub total_slots: u32,
    pub cluster_size: usize,
    pub total_keys: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_message_omits_absent_value() {
        let msg = UpdateMessage {
            action: "del".into(),
            key: "k".into(),
            value: None,
        };
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"action":"del","key":"k"}"#
        );
    }

    #[test]
    fn test_node_stats_reports_unassigned_as_minus_one() {
        let node = Node::new("id".into(), "127.0.0.1", 6379);
        let stats = NodeStats::from_node(&node);
        assert_eq!(stats.slot_start, -1);
        assert_eq!(stats.slot_end, -1);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["slotStart"], -1);
        assert_eq!(json["keyCount"], 0);
    }
}

//! Command Core
//!
//! Validates commands, enforces slot ownership, journals to the WAL,
//! applies to the store, and publishes updates to the hub. Keys and
//! values flow through as opaque bytes; only verbs are read as text.

use std::io;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info};

use crate::cluster::{hash_slot, ClusterManager, SLOT_COUNT};
use crate::hub::{ClusterInfoMessage, ClusterStatsMessage, Hub, NodeStats};
use crate::storage::Store;
use crate::wal::{WalError, WalReader, WalWriter};

/// Failures surfaced to clients or the transport layer
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("wrong number of arguments for '{0}'")]
    Arity(&'static str),

    #[error("{0}")]
    Protocol(String),

    #[error("key not found")]
    NotFound,

    /// The key's slot belongs to another node
    #[error("MOVED {slot} {host}:{port}")]
    Moved { slot: u16, host: String, port: u16 },

    /// The journal append failed; the mutation was not applied
    #[error("failed to write to WAL: {0}")]
    Wal(#[source] io::Error),

    #[error("{0}")]
    Cluster(String),
}

/// Outcome of an applied mutation, used to drive broadcasts
#[derive(Debug, Clone)]
pub struct Applied {
    pub action: &'static str,
    pub key: Bytes,
    pub value: Option<Bytes>,
    /// Whether a cluster-stats snapshot should follow the update
    pub needs_stats: bool,
}

/// Executes validated commands against the store.
///
/// For every mutation the order is fixed: WAL append happens before the
/// store changes, and the store changes before anything is broadcast.
pub struct CommandHandler {
    store: Store,
    cluster: Arc<Mutex<ClusterManager>>,
    wal: WalWriter,
    hub: Hub,
}

impl CommandHandler {
    pub fn new(
        store: Store,
        cluster: Arc<Mutex<ClusterManager>>,
        wal: WalWriter,
        hub: Hub,
    ) -> Self {
        Self {
            store,
            cluster,
            wal,
            hub,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Replay the journal into the store before serving traffic.
    ///
    /// Records are applied through the store primitives directly: no WAL
    /// writes, no stats, no broadcasts. An unknown verb is fatal.
    pub fn replay(&self, reader: &mut WalReader) -> Result<usize, WalError> {
        let mut applied = 0;

        while let Some(record) = reader.next_record()? {
            match record.first().map(|verb| verb.as_ref()) {
                Some(b"SET") if record.len() == 3 => {
                    self.store.set(record[1].clone(), record[2].clone());
                }
                Some(b"DEL") if record.len() == 2 => {
                    self.store.delete(&record[1]);
                }
                _ => {
                    return Err(WalError::Corrupt(format!(
                        "unreplayable record: {record:?}"
                    )));
                }
            }
            applied += 1;
        }

        Ok(applied)
    }

    /// `SET <key> <value>`
    pub fn handle_set(&self, parts: &[Bytes]) -> Result<Applied, CommandError> {
        if parts.len() != 3 {
            return Err(CommandError::Arity("SET"));
        }
        let (key, value) = (&parts[1], &parts[2]);
        self.check_slot_ownership(key)?;

        // Journal the canonical form so replay never sees verb aliasing
        self.wal
            .append(&[Bytes::from_static(b"SET"), key.clone(), value.clone()])
            .map_err(|err| {
                error!(%err, "failed to write to WAL");
                CommandError::Wal(err)
            })?;

        let prior = self.store.get(key);
        self.store.set(key.clone(), value.clone());

        let needs_stats = {
            let mut cluster = self.cluster.lock().unwrap();
            match &prior {
                None => {
                    cluster.incr_keys();
                    cluster.add_bytes(key.len(), value.len());
                }
                Some(old) => {
                    cluster.sub_bytes(key.len(), old.len());
                    cluster.add_bytes(key.len(), value.len());
                }
            }
            cluster.len() > 1
        };

        Ok(Applied {
            action: "set",
            key: key.clone(),
            value: Some(value.clone()),
            needs_stats,
        })
    }

    /// `GET <key>`: read-only, no WAL, no broadcast
    pub fn handle_get(&self, parts: &[Bytes]) -> Result<Bytes, CommandError> {
        if parts.len() != 2 {
            return Err(CommandError::Arity("GET"));
        }
        let key = &parts[1];
        self.check_slot_ownership(key)?;

        self.store.get(key).ok_or(CommandError::NotFound)
    }

    /// `DEL <key>`: returns the broadcast payload when a key was removed
    pub fn handle_del(&self, parts: &[Bytes]) -> Result<Option<Applied>, CommandError> {
        if parts.len() != 2 {
            return Err(CommandError::Arity("DEL"));
        }
        let key = &parts[1];
        self.check_slot_ownership(key)?;

        self.wal
            .append(&[Bytes::from_static(b"DEL"), key.clone()])
            .map_err(|err| {
                error!(%err, "failed to write to WAL");
                CommandError::Wal(err)
            })?;

        let prior = self.store.get(key);
        if !self.store.delete(key) {
            return Ok(None);
        }

        let needs_stats = {
            let mut cluster = self.cluster.lock().unwrap();
            cluster.decr_keys();
            if let Some(old) = &prior {
                cluster.sub_bytes(key.len(), old.len());
            }
            cluster.len() > 1
        };

        Ok(Some(Applied {
            action: "del",
            key: key.clone(),
            value: None,
            needs_stats,
        }))
    }

    /// `CLUSTER <subcommand> …`
    pub fn handle_cluster(&self, parts: &[Bytes]) -> Result<(), CommandError> {
        if parts.len() < 2 {
            return Err(CommandError::Arity("CLUSTER"));
        }

        match parts[1].to_ascii_uppercase().as_slice() {
            b"MEET" => self.cluster_meet(parts),
            b"NODES" | b"INFO" => Err(CommandError::Cluster(format!(
                "CLUSTER {} not implemented",
                String::from_utf8_lossy(&parts[1]).to_uppercase()
            ))),
            _ => Err(CommandError::Cluster(format!(
                "unknown cluster subcommand '{}'",
                String::from_utf8_lossy(&parts[1])
            ))),
        }
    }

    fn cluster_meet(&self, parts: &[Bytes]) -> Result<(), CommandError> {
        if parts.len() != 4 {
            return Err(CommandError::Arity("CLUSTER MEET"));
        }

        let host = std::str::from_utf8(&parts[2])
            .map_err(|_| CommandError::Cluster("invalid host".to_string()))?;
        let port: u16 = std::str::from_utf8(&parts[3])
            .ok()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| {
                CommandError::Cluster(format!(
                    "invalid port '{}'",
                    String::from_utf8_lossy(&parts[3])
                ))
            })?;

        let mut cluster = self.cluster.lock().unwrap();
        let id = cluster.add_node(host, port);
        info!(node = %id, total = cluster.len(), "node added to cluster");

        Ok(())
    }

    /// Reject keys whose slot another node owns.
    ///
    /// Ownership is only enforced once the cluster is routed (three or
    /// more nodes); a standalone node serves every slot.
    fn check_slot_ownership(&self, key: &[u8]) -> Result<(), CommandError> {
        let cluster = self.cluster.lock().unwrap();
        if !cluster.routed() {
            return Ok(());
        }

        let slot = hash_slot(key);
        if cluster.self_node().owns_slot(slot) {
            return Ok(());
        }

        let owner = cluster.owner(slot);
        Err(CommandError::Moved {
            slot,
            host: owner.host.clone(),
            port: owner.port,
        })
    }

    /// Publish the per-command broadcasts for an applied mutation
    pub fn publish(&self, applied: &Applied) {
        self.hub
            .broadcast_update(applied.action, &applied.key, applied.value.as_deref());

        if applied.needs_stats {
            self.hub.broadcast_cluster_stats(&self.cluster_stats());
        }
    }

    /// Cluster-wide stats snapshot.
    ///
    /// The local node reports live store counts; remote nodes report their
    /// last known values.
    pub fn cluster_stats(&self) -> ClusterStatsMessage {
        let (nodes, current_node_id, cluster_size) = self.node_rows();
        let total_keys = nodes.iter().map(|n| n.key_count).sum();

        ClusterStatsMessage {
            action: "cluster_stats".to_string(),
            nodes,
            current_node_id,
            total_slots: SLOT_COUNT as u32,
            cluster_size,
            total_keys,
        }
    }

    /// Cluster topology reply for `cluster_info` requests
    pub fn cluster_info(&self) -> ClusterInfoMessage {
        let (nodes, current_node_id, cluster_size) = self.node_rows();

        ClusterInfoMessage {
            action: "cluster_info".to_string(),
            nodes,
            current_node_id,
            total_slots: SLOT_COUNT as u32,
            cluster_size,
        }
    }

    fn node_rows(&self) -> (Vec<NodeStats>, String, usize) {
        // Store counters are read before taking the cluster lock so the
        // two locks are never held together.
        let key_count = self.store.len() as u64;
        let byte_size = self.store.total_bytes();

        let mut cluster = self.cluster.lock().unwrap();
        cluster.set_self_stats(key_count, byte_size);

        let nodes = cluster.nodes().map(NodeStats::from_node).collect();
        (nodes, cluster.self_id().to_string(), cluster.len())
    }
}

//! CRIMSON - Redis-Wire-Compatible Clustered Cache
//!
//! An in-memory key-value store with LRU+TTL eviction, an append-durable
//! write-ahead log, 16384-slot cluster routing, and real-time fan-out of
//! store updates to WebSocket subscribers.

pub mod cluster;
pub mod hub;
pub mod server;
pub mod storage;
pub mod wal;

pub use cluster::{hash_slot, ClusterManager, Node, SlotRange, SLOT_COUNT};
pub use hub::Hub;
pub use server::{CommandError, CommandHandler, Config, Server};
pub use storage::{ExpirationSweeper, Store};
pub use wal::{WalError, WalReader, WalWriter};

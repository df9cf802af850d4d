//! Write-Ahead Log
//!
//! RESP-framed command journal: fsync-on-append durability and sequential
//! replay at startup.

mod codec;
mod reader;
mod writer;

pub use codec::{decode_record, encode_record};
pub use reader::WalReader;
pub use writer::WalWriter;

use thiserror::Error;

/// Failures reading or replaying the journal
#[derive(Debug, Error)]
pub enum WalError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structurally invalid data mid-stream; the whole replay is abandoned
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

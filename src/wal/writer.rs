//! WAL Writer
//!
//! Append-only command journal with a durable commit per append.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::codec::encode_record;

/// Append-only journal of mutating commands.
///
/// Every append is written and fsynced before returning, so a command
/// acknowledged to the caller is recoverable after a crash.
pub struct WalWriter {
    file: Mutex<File>,
    path: PathBuf,
}

impl WalWriter {
    /// Create or open the journal file for appending
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// Append a command tuple and force it to disk
    pub fn append<S: AsRef<[u8]>>(&self, command: &[S]) -> io::Result<()> {
        let encoded = encode_record(command);
        let mut file = self.file.lock().unwrap();
        file.write_all(&encoded)?;
        file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

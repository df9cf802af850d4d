//! WAL Reader
//!
//! Sequential replay of the command journal.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use bytes::Bytes;

use super::codec::decode_record;
use super::WalError;

/// Reads journaled command tuples in append order.
///
/// A torn tail (crash mid-append) ends the stream at the last complete
/// record; corruption with data still behind it is an error.
pub struct WalReader {
    reader: BufReader<File>,
}

impl WalReader {
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
        })
    }

    /// Next record, or `None` at end of stream
    pub fn next_record(&mut self) -> Result<Option<Vec<Bytes>>, WalError> {
        decode_record(&mut self.reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wal::WalWriter;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_back_in_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WalWriter::open(&path).unwrap();
        wal.append(&["SET", "a", "1"]).unwrap();
        wal.append(&["SET", "b", "2"]).unwrap();
        wal.append(&["DEL", "a"]).unwrap();

        let mut reader = WalReader::open(&path).unwrap();
        assert_eq!(reader.next_record().unwrap().unwrap(), vec!["SET", "a", "1"]);
        assert_eq!(reader.next_record().unwrap().unwrap(), vec!["SET", "b", "2"]);
        assert_eq!(reader.next_record().unwrap().unwrap(), vec!["DEL", "a"]);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_torn_tail_stops_at_last_complete_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let wal = WalWriter::open(&path).unwrap();
        wal.append(&["SET", "a", "1"]).unwrap();
        drop(wal);

        // Simulate a crash mid-append
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"*3\r\n$3\r\nSET\r\n$5\r\npart").unwrap();
        drop(file);

        let mut reader = WalReader::open(&path).unwrap();
        assert_eq!(reader.next_record().unwrap().unwrap(), vec!["SET", "a", "1"]);
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_fails_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wal");

        let mut file = File::create(&path).unwrap();
        file.write_all(b"*1\r\n$3\r\nab\r\n*1\r\n$1\r\nx\r\n").unwrap();
        drop(file);

        let mut reader = WalReader::open(&path).unwrap();
        assert!(reader.next_record().is_err());
    }
}

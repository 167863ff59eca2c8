//! Durable storage: the KV adapter (§4.1) and the write-ahead log (§4.2).

pub mod checksum;
pub mod kv;
pub mod wal;

pub use kv::{FileKvStore, KvIterator, WriteBatch};
pub use wal::{SchemaChangeKind, WalRecord, WriteAheadLog};

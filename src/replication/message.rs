//! Wire messages and log entries for the VR-style replicated log
//! (spec.md §4.10).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub op_number: u64,
    pub payload: Vec<u8>,
}

/// Every message a replica can send or receive. Mirrors the Viewstamped
/// Replication protocol's message set (Liskov & Cowling), trimmed to the
/// normal-operation and view-change sub-protocols `spec.md` §4.10 asks
/// for (no separate recovery/state-transfer sub-protocol).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// A client operation forwarded to whichever replica the sender
    /// currently believes is primary.
    Request { client_id: u64, payload: Vec<u8> },
    Prepare {
        view: u64,
        op_number: u64,
        payload: Vec<u8>,
        commit_number: u64,
    },
    PrepareOk {
        view: u64,
        op_number: u64,
        replica_id: u64,
    },
    Commit {
        view: u64,
        commit_number: u64,
    },
    StartViewChange {
        view: u64,
        replica_id: u64,
    },
    DoViewChange {
        view: u64,
        replica_id: u64,
        log: Vec<LogEntry>,
        last_normal_view: u64,
        op_number: u64,
        commit_number: u64,
    },
    StartView {
        view: u64,
        log: Vec<LogEntry>,
        op_number: u64,
        commit_number: u64,
    },
}

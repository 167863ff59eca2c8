//! Single replica state machine (spec.md §4.10): normal-operation
//! prepare/prepare-ok/commit flow plus the view-change sub-protocol.
//!
//! No teacher module implements consensus (`motedb` is single-node), so
//! this is built from scratch following the Viewstamped Replication
//! protocol, using the teacher's concurrency idiom throughout:
//! `parking_lot::RwLock`/`Mutex` guarding each replica's mutable state
//! rather than lock-free structures, `thiserror`-typed errors for every
//! fallible transition.

use crate::error::{DbError, Result};
use crate::replication::message::{LogEntry, Message};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Primary,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Normal,
    ViewChange,
}

/// A message a replica wants sent, addressed either to one replica or
/// broadcast to every other replica in the group.
#[derive(Debug, Clone)]
pub enum Outbound {
    To(u64, Message),
    Broadcast(Message),
}

pub struct Replica {
    pub id: u64,
    replica_count: usize,
    view: AtomicU64,
    status: RwLock<Status>,
    /// View in which this replica last had `Status::Normal`, used to pick
    /// the most up-to-date log among `DoViewChange` votes.
    last_normal_view: AtomicU64,
    log: RwLock<Vec<LogEntry>>,
    commit_number: AtomicU64,
    prepare_oks: Mutex<HashMap<u64, HashSet<u64>>>,
    view_change_votes: Mutex<HashMap<u64, HashSet<u64>>>,
    do_view_change_votes: Mutex<HashMap<u64, Vec<(u64, Vec<LogEntry>, u64, u64, u64)>>>,
}

impl Replica {
    pub fn new(id: u64, replica_count: usize) -> Self {
        Self {
            id,
            replica_count,
            view: AtomicU64::new(0),
            status: RwLock::new(Status::Normal),
            last_normal_view: AtomicU64::new(0),
            log: RwLock::new(Vec::new()),
            commit_number: AtomicU64::new(0),
            prepare_oks: Mutex::new(HashMap::new()),
            view_change_votes: Mutex::new(HashMap::new()),
            do_view_change_votes: Mutex::new(HashMap::new()),
        }
    }

    fn quorum(&self) -> usize {
        self.replica_count / 2 + 1
    }

    pub fn view(&self) -> u64 {
        self.view.load(Ordering::SeqCst)
    }

    pub fn commit_number(&self) -> u64 {
        self.commit_number.load(Ordering::SeqCst)
    }

    pub fn op_number(&self) -> u64 {
        self.log.read().len() as u64
    }

    pub fn log_snapshot(&self) -> Vec<LogEntry> {
        self.log.read().clone()
    }

    /// The replica that owns the primary role for `view`, round-robin
    /// over the group as VR's `primary = view mod |replicas|` rule.
    pub fn primary_for_view(view: u64, replica_count: usize) -> u64 {
        view % replica_count as u64
    }

    pub fn role(&self) -> Role {
        if self.id == Self::primary_for_view(self.view(), self.replica_count) {
            Role::Primary
        } else {
            Role::Backup
        }
    }

    fn is_normal(&self) -> bool {
        *self.status.read() == Status::Normal
    }

    /// Primary-only: accept a client request, append to the log, and
    /// broadcast `Prepare` to every backup.
    pub fn propose(&self, payload: Vec<u8>) -> Result<Vec<Outbound>> {
        if self.role() != Role::Primary {
            return Err(DbError::NotPrimary(Some(Self::primary_for_view(
                self.view(),
                self.replica_count,
            ))));
        }
        if !self.is_normal() {
            return Err(DbError::InvalidStateTransition {
                from: "ViewChange".into(),
                to: "Prepare".into(),
            });
        }

        let op_number = {
            let mut log = self.log.write();
            let op_number = log.len() as u64 + 1;
            log.push(LogEntry {
                op_number,
                payload: payload.clone(),
            });
            op_number
        };

        // The primary counts its own vote immediately.
        self.prepare_oks
            .lock()
            .entry(op_number)
            .or_default()
            .insert(self.id);

        debug!(replica = self.id, view = self.view(), op_number, "proposing");
        Ok(vec![Outbound::Broadcast(Message::Prepare {
            view: self.view(),
            op_number,
            payload,
            commit_number: self.commit_number(),
        })])
    }

    pub fn handle(&self, from: u64, message: Message) -> Result<Vec<Outbound>> {
        match message {
            Message::Prepare {
                view,
                op_number,
                payload,
                commit_number,
            } => self.on_prepare(view, op_number, payload, commit_number),
            Message::PrepareOk {
                view,
                op_number,
                replica_id,
            } => self.on_prepare_ok(view, op_number, replica_id),
            Message::Commit { view, commit_number } => self.on_commit(view, commit_number),
            Message::StartViewChange { view, replica_id } => {
                self.on_start_view_change(view, replica_id)
            }
            Message::DoViewChange {
                view,
                replica_id,
                log,
                last_normal_view,
                op_number,
                commit_number,
            } => self.on_do_view_change(view, replica_id, log, last_normal_view, op_number, commit_number),
            Message::StartView {
                view,
                log,
                op_number,
                commit_number,
            } => self.on_start_view(view, log, op_number, commit_number),
            Message::Request { client_id, payload } => {
                let _ = (from, client_id);
                self.propose(payload)
            }
        }
    }

    fn on_prepare(
        &self,
        view: u64,
        op_number: u64,
        payload: Vec<u8>,
        leader_commit: u64,
    ) -> Result<Vec<Outbound>> {
        if view < self.view() {
            return Ok(Vec::new());
        }
        if view > self.view() {
            self.view.store(view, Ordering::SeqCst);
            *self.status.write() = Status::Normal;
        }

        let mut log = self.log.write();
        if op_number == log.len() as u64 + 1 {
            log.push(LogEntry { op_number, payload });
        } else if op_number <= log.len() as u64 {
            // Already have it (duplicate delivery); accept idempotently.
        } else {
            // Gap: this spec's simulation delivers in order, so a gap
            // indicates a dropped message; ignore and let a later
            // retransmit (or view change) repair it.
            return Ok(Vec::new());
        }
        drop(log);

        let advance_to = leader_commit.min(op_number);
        self.advance_commit(advance_to);

        Ok(vec![Outbound::To(
            Self::primary_for_view(view, self.replica_count),
            Message::PrepareOk {
                view,
                op_number,
                replica_id: self.id,
            },
        )])
    }

    fn advance_commit(&self, new_commit: u64) {
        let _ = self
            .commit_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                if new_commit > cur {
                    Some(new_commit)
                } else {
                    None
                }
            });
    }

    fn on_prepare_ok(&self, view: u64, op_number: u64, replica_id: u64) -> Result<Vec<Outbound>> {
        if view != self.view() || self.role() != Role::Primary {
            return Ok(Vec::new());
        }
        let acked = {
            let mut oks = self.prepare_oks.lock();
            let voters = oks.entry(op_number).or_default();
            voters.insert(replica_id);
            voters.len()
        };
        if acked >= self.quorum() && op_number > self.commit_number() {
            self.advance_commit(op_number);
            info!(replica = self.id, view, op_number, "commit point advanced");
            return Ok(vec![Outbound::Broadcast(Message::Commit {
                view,
                commit_number: op_number,
            })]);
        }
        Ok(Vec::new())
    }

    fn on_commit(&self, view: u64, commit_number: u64) -> Result<Vec<Outbound>> {
        if view < self.view() {
            return Ok(Vec::new());
        }
        self.advance_commit(commit_number);
        Ok(Vec::new())
    }

    /// Backup-initiated: suspect the primary has failed and start a view
    /// change to `target_view`.
    pub fn start_view_change(&self, target_view: u64) -> Vec<Outbound> {
        *self.status.write() = Status::ViewChange;
        self.view_change_votes
            .lock()
            .entry(target_view)
            .or_default()
            .insert(self.id);
        vec![Outbound::Broadcast(Message::StartViewChange {
            view: target_view,
            replica_id: self.id,
        })]
    }

    fn on_start_view_change(&self, view: u64, replica_id: u64) -> Result<Vec<Outbound>> {
        if view <= self.view() && self.is_normal() {
            return Ok(Vec::new());
        }
        let acked = {
            let mut votes = self.view_change_votes.lock();
            let voters = votes.entry(view).or_default();
            voters.insert(replica_id);
            voters.insert(self.id);
            voters.len()
        };
        if acked >= self.quorum() {
            *self.status.write() = Status::ViewChange;
            let new_primary = Self::primary_for_view(view, self.replica_count);
            return Ok(vec![Outbound::To(
                new_primary,
                Message::DoViewChange {
                    view,
                    replica_id: self.id,
                    log: self.log_snapshot(),
                    last_normal_view: self.last_normal_view.load(Ordering::SeqCst),
                    op_number: self.op_number(),
                    commit_number: self.commit_number(),
                },
            )]);
        }
        Ok(Vec::new())
    }

    fn on_do_view_change(
        &self,
        view: u64,
        replica_id: u64,
        log: Vec<LogEntry>,
        last_normal_view: u64,
        op_number: u64,
        commit_number: u64,
    ) -> Result<Vec<Outbound>> {
        if Self::primary_for_view(view, self.replica_count) != self.id {
            return Ok(Vec::new());
        }
        let votes = {
            let mut all = self.do_view_change_votes.lock();
            let entries = all.entry(view).or_default();
            entries.push((replica_id, log, last_normal_view, op_number, commit_number));
            entries.clone()
        };
        if votes.len() >= self.quorum() {
            let best = votes
                .iter()
                .max_by_key(|(_, _, last_normal, op_num, _)| (*last_normal, *op_num))
                .cloned()
                .expect("quorum implies at least one vote");
            let (_, best_log, _, best_op_number, _) = best;
            let best_commit = votes.iter().map(|(_, _, _, _, c)| *c).max().unwrap_or(0);

            self.view.store(view, Ordering::SeqCst);
            self.last_normal_view.store(view, Ordering::SeqCst);
            *self.status.write() = Status::Normal;
            *self.log.write() = best_log.clone();
            self.advance_commit(best_commit);
            let _ = best_op_number;

            info!(replica = self.id, view, "became primary via view change");
            return Ok(vec![Outbound::Broadcast(Message::StartView {
                view,
                log: best_log,
                op_number: self.op_number(),
                commit_number: self.commit_number(),
            })]);
        }
        Ok(Vec::new())
    }

    fn on_start_view(
        &self,
        view: u64,
        log: Vec<LogEntry>,
        _op_number: u64,
        commit_number: u64,
    ) -> Result<Vec<Outbound>> {
        if view < self.view() {
            return Ok(Vec::new());
        }
        self.view.store(view, Ordering::SeqCst);
        self.last_normal_view.store(view, Ordering::SeqCst);
        *self.status.write() = Status::Normal;
        *self.log.write() = log;
        self.advance_commit(commit_number);
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_round_robin_matches_view_modulo_count() {
        assert_eq!(Replica::primary_for_view(0, 3), 0);
        assert_eq!(Replica::primary_for_view(1, 3), 1);
        assert_eq!(Replica::primary_for_view(3, 3), 0);
    }

    #[test]
    fn backup_cannot_propose() {
        let backup = Replica::new(1, 3);
        assert!(matches!(backup.propose(vec![1]), Err(DbError::NotPrimary(_))));
    }

    #[test]
    fn prepare_ok_quorum_advances_commit_point() {
        let primary = Replica::new(0, 3);
        let out = primary.propose(b"op1".to_vec()).unwrap();
        assert!(matches!(out[0], Outbound::Broadcast(Message::Prepare { op_number: 1, .. })));

        assert_eq!(primary.commit_number(), 0);
        let out = primary
            .handle(
                1,
                Message::PrepareOk {
                    view: 0,
                    op_number: 1,
                    replica_id: 1,
                },
            )
            .unwrap();
        assert_eq!(primary.commit_number(), 1);
        assert!(matches!(out[0], Outbound::Broadcast(Message::Commit { commit_number: 1, .. })));
    }

    #[test]
    fn commit_point_never_regresses() {
        let replica = Replica::new(1, 3);
        replica.advance_commit(5);
        replica.advance_commit(2);
        assert_eq!(replica.commit_number(), 5);
    }
}

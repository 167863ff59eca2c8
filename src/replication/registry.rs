//! Registry of replicas participating in one replicated log group.

use crate::error::{DbError, Result};
use crate::replication::replica::{Replica, Role};
use dashmap::DashMap;
use std::sync::Arc;

pub struct ReplicaRegistry {
    replicas: DashMap<u64, Arc<Replica>>,
    replica_count: usize,
    /// Explicit node-id -> role bookkeeping (spec.md §4.10's "Registry"
    /// paragraph), independent of the view-derived `Replica::role()` the
    /// simulation uses for message routing. This is what an operator
    /// layer consults to reject a double `Primary` registration or to
    /// model a node crash by removing it outright.
    roles: DashMap<u64, Role>,
}

impl ReplicaRegistry {
    /// Build a fresh group of `replica_count` replicas, ids `0..replica_count`.
    pub fn new(replica_count: usize) -> Self {
        let replicas = DashMap::new();
        for id in 0..replica_count as u64 {
            replicas.insert(id, Arc::new(Replica::new(id, replica_count)));
        }
        Self {
            replicas,
            replica_count,
            roles: DashMap::new(),
        }
    }

    pub fn get(&self, id: u64) -> Result<Arc<Replica>> {
        self.replicas
            .get(&id)
            .map(|e| e.clone())
            .ok_or(DbError::ReplicaNotFound(id))
    }

    pub fn ids(&self) -> Vec<u64> {
        (0..self.replica_count as u64).collect()
    }

    pub fn replica_count(&self) -> usize {
        self.replica_count
    }

    pub fn primary_id(&self) -> u64 {
        let any = self.get(0).expect("replica 0 always exists");
        Replica::primary_for_view(any.view(), self.replica_count)
    }

    /// Register `id`'s role. Registering a second `Primary` while one is
    /// already registered fails `PrimaryAlreadyExists` (spec.md §4.10,
    /// invariant I5: at most one primary per view).
    pub fn register_role(&self, id: u64, role: Role) -> Result<()> {
        if role == Role::Primary {
            if let Some(existing) = self.roles.iter().find(|e| *e.value() == Role::Primary) {
                return Err(DbError::PrimaryAlreadyExists(*existing.key()));
            }
        }
        self.roles.insert(id, role);
        Ok(())
    }

    /// Remove `id` from the role registry, modeling a crash. Allowed even
    /// for a registered `Primary` — that's exactly how a primary failure
    /// is expressed here.
    pub fn remove_role(&self, id: u64) -> Result<Role> {
        self.roles
            .remove(&id)
            .map(|(_, role)| role)
            .ok_or(DbError::ReplicaNotFound(id))
    }

    pub fn role_of(&self, id: u64) -> Result<Role> {
        self.roles.get(&id).map(|r| *r).ok_or(DbError::ReplicaNotFound(id))
    }
}

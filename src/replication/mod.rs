//! VR-style replicated log (spec.md §4.10): primary/backup role
//! assignment, quorum-gated commit, view changes on suspected primary
//! failure, and a deterministic in-process message fabric for testing.

pub mod message;
pub mod registry;
pub mod replica;
pub mod simulation;

pub use message::{LogEntry, Message};
pub use registry::ReplicaRegistry;
pub use replica::{Outbound, Replica, Role};
pub use simulation::Simulation;

//! Persistence collaborator ports.
//!
//! The core consumes these traits and never a concrete database client. Real
//! CRUD implementations are out of scope; [`memory`] holds the in-memory
//! reference implementations the test suite and single-process deployments
//! run against.

pub mod event_store;
pub mod guild_store;
pub mod memory;

pub use event_store::EventStore;
pub use guild_store::GuildStore;
pub use memory::{MemoryEventStore, MemoryGuildStore};

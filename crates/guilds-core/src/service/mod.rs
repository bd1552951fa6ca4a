//! Aggregate collaborator services.

pub mod guild;

pub use guild::GuildService;

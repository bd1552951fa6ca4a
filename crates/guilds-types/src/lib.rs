//! Wire and domain types for the guilds service.
//!
//! This crate contains everything that crosses the broker or the persistence
//! boundary: the `Delivery` envelope, the tagged `Payload` union, the guild
//! aggregate state and its views, broker settings, and the error taxonomy.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod delivery;
pub mod error;
pub mod guild;
pub mod payload;

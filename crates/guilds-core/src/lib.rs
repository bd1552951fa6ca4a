//! Core engineering for the guilds service.
//!
//! This crate defines the "ports" the infrastructure layer implements and the
//! machinery between them:
//!
//! - [`broker`] -- the `MessageBroker` trait (RPC, pub/sub, topics, plain
//!   queues) and the in-process `MemoryBroker` substrate
//! - [`dispatch`] -- the request dispatcher and the explicit handler registry
//! - [`aggregate`] -- the per-key guild cache, the per-guild handle, and the
//!   replay state cell behind it
//! - [`service`] -- the read-apply-persist-publish mutation pipeline
//! - [`repository`] -- persistence collaborator traits plus in-memory
//!   reference implementations
//! - [`handler`] -- the guild command/query handlers and registry wiring
//!
//! This crate depends only on `guilds-types` -- never on `guilds-infra` or
//! any broker/database client crate.

pub mod aggregate;
pub mod broker;
pub mod dispatch;
pub mod handler;
pub mod repository;
pub mod service;

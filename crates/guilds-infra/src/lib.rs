//! Infrastructure layer for the guilds service.
//!
//! Contains the AMQP implementation of the `MessageBroker` port defined in
//! `guilds-core` and the configuration loader for broker settings.

pub mod amqp;
pub mod config;

pub use amqp::AmqpMessageBroker;
pub use config::load_broker_settings;

//! AMQP 0.9.1 implementation of the `MessageBroker` port, built on `lapin`.

mod broker;
mod codec;

pub use broker::AmqpMessageBroker;

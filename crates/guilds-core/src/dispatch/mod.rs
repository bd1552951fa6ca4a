//! Ingress demultiplexing.
//!
//! One [`RequestDispatcher`] per process owns the RPC ingress: it splits the
//! queue into a command drain and a query drain, looks handlers up in an
//! explicit [`HandlerRegistry`], and sends query replies (or faults) back to
//! the requester's reply destination.

mod dispatcher;
mod registry;

pub use dispatcher::RequestDispatcher;
pub use registry::{CommandHandler, HandlerRegistry, QueryHandler};

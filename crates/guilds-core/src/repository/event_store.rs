//! Domain-event persistence port.

use std::future::Future;

use guilds_types::delivery::Delivery;
use guilds_types::error::RepositoryError;

/// Append-only store for domain-event deliveries.
///
/// `add` assigns the delivery its persistence identity: the returned copy
/// carries a non-empty `event_id`, the argument's stays untouched.
pub trait EventStore: Send + Sync + 'static {
    fn add(
        &self,
        delivery: &Delivery,
    ) -> impl Future<Output = Result<Delivery, RepositoryError>> + Send;
}

impl<T: EventStore> EventStore for std::sync::Arc<T> {
    fn add(
        &self,
        delivery: &Delivery,
    ) -> impl Future<Output = Result<Delivery, RepositoryError>> + Send {
        (**self).add(delivery)
    }
}

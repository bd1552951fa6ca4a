//! The per-key aggregate layer: one live guild handle per external key per
//! process, each owning its latest snapshot behind a replay cell.

pub mod cache;
pub mod handle;
pub mod state_cell;

pub use cache::GuildCache;
pub use handle::GuildHandle;
pub use state_cell::{StateCell, StateWatch};

//! Ticket status store.
//!
//! Maps a ticket id to the status payload written last. The store has no
//! schema beyond that: readers interpret the payload by operation kind.
//! Writes are blind overwrites; each ticket has one legitimate writer per
//! transition, so last writer wins.

mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStatusStore;
pub use sqlite::SqliteStatusStore;
pub use store::{open_status_store, RetentionPolicy, StatusStore, StatusStoreUrl};

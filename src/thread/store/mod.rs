//! Record store adapter seam.
//!
//! The engine consumes a [`Subscription`] per thread scope and writes through
//! [`RecordStore`]. Any transport (push, polling, sockets) can sit behind it.

pub mod api;
pub mod memory;

#[cfg(test)]
mod tests;

pub use api::{LikeDelta, RecordStore, StoreUpdate, Subscription};
pub use memory::InMemoryRecordStore;

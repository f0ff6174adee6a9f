//! Pure thread data: records, the parent/child index and per-view state.
//! Nothing in here performs I/O.

pub mod index;
pub mod record;
pub mod trending;
pub mod view_state;
pub mod visibility;

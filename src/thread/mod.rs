//! Threaded replies: index, view state, engine, store seam and sessions.

pub mod domain;
pub mod engine;
pub mod mutator;
pub mod runtime;
pub mod store;

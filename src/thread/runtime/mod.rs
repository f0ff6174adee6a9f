//! Imperative shell for thread views.
//!
//! [`ThreadSession`] owns one engine, one store subscription and the viewer's
//! identity, and is driven directly with `&mut self`. [`SessionDriver`] moves a
//! session onto its own task and serves it through a cloneable
//! [`SessionHandle`], so store writes run in the background.

pub mod driver;
pub mod orchestrator;


pub use driver::{SessionDriver, SessionHandle};
pub use orchestrator::ThreadSession;

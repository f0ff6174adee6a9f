pub mod config;
pub mod error;
pub mod fixture;
pub mod thread;

pub use config::EngineConfig;
pub use error::{StoreError, ThreadError};
pub use thread::domain::record::{Author, NodeId, ReplyRecord, ScopeKind, ThreadScope, UserId};
pub use thread::domain::visibility::{RenderModel, RenderNode};
pub use thread::runtime::{SessionDriver, SessionHandle, ThreadSession};
pub use thread::store::{InMemoryRecordStore, RecordStore};

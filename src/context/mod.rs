//! Run-time context: the per-deployment tree the builder populates, the
//! scheduler prunes and the sync engine reconciles.
//!
//! The tree lives in a key-value keyspace separate from the document store.
//! Every node is a key ending in `/`, so a node's subtree is a key prefix.

pub mod app_context;
pub mod handle;
pub mod kv;
pub mod types;

pub use app_context::AppContext;
pub use handle::Handle;
pub use kv::{KvStore, SqliteKv};
pub use types::{CompositeAppMeta, ContextStatus, InstructionKind, ResourceStatus};

//! Graftom core library.
//!
//! Writes a record and reconciles the related records submitted with it:
//! one-to-one upserts, one-to-many attach/detach with a removal policy, and
//! many-to-many pivot syncing. Storage sits behind the [`store::Store`] trait.

pub mod config;
pub mod errors;
pub mod examples;
pub mod id;
pub mod input;
pub mod keys;
pub mod registry;
pub mod store;
pub mod types;
pub mod write;

pub use config::{GraftomConfig, Settings, WriteOptions};
pub use errors::*;
pub use input::{FieldDescriptor, RelationOptions, RelationSubmission, RelationSubmissions, split_input};
pub use registry::*;
pub use store::{Filter, MemoryStore, RedisStore, Store, StoreStats};
pub use types::{
    Attributes, CastType, ColumnDescriptor, KeyStrategy, MorphDescriptor, PivotDescriptor, RelationDescriptor,
    RelationKind, Row, TableDescriptor,
};
pub use write::{RecordWriter, RemovalAction};

// Re-export redis types so users don't need to depend on a specific redis version
pub use redis;
pub use redis::aio::ConnectionManager;

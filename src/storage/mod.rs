//! Ordered key/value store layer (spec.md §4.1).

pub mod batch;
pub mod handle;
pub mod store;
pub mod stores;

pub use batch::Batch;
pub use handle::{StoreHandle, StoreHandleMut};
pub use store::Store;
pub use stores::{OpenOutcome, Stores, SCHEMA_VERSION};

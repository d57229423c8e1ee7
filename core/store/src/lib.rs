//! Encrypted document collections for Curio.
//!
//! Records live in append-only journal files, one encrypted line per record.
//! Queries and updates use closed, typed expressions instead of untyped
//! operator maps.

pub mod collection;
pub mod query;
pub mod store;

pub use collection::Collection;
pub use query::{Filter, FindOptions, SortOrder, Update};
pub use store::DocumentStore;

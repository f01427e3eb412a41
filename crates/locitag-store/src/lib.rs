//! locitag-store — Search store contract and an in-memory implementation.
//!
//! The criteria engine only talks to a [`SearchStore`]. Production deployments
//! back it with the document search index; [`MemoryStore`] serves fixtures and
//! tests with the same paging and overlap semantics.

pub mod search;
pub mod memory;

pub use memory::MemoryStore;
pub use search::{Page, PageCursor, RangeQuery, SearchStore};

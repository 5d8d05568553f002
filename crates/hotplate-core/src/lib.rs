//! Hotplate core
//!
//! Types shared by every Hotplate crate: hierarchical document paths,
//! JSON document bodies, the `DocumentStore` interface the policy layer
//! guards, and the common error type.

pub mod error;
pub mod memory;
pub mod traits;
pub mod types;

pub use error::*;
pub use memory::InMemoryStore;
pub use traits::*;
pub use types::*;

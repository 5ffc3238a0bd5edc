//! LanceDB-backed chunk storage for the summary hierarchy's leaves.

pub mod schema;
pub mod search;
pub mod store;
pub mod table;
pub mod writer;

pub use store::LanceDocumentStore;

//! Store clients, the pure helpers, and the dispatcher that composes them.

pub mod blob_store;
pub mod dispatcher;
pub mod filter;
pub mod identity;
#[cfg(test)]
pub mod memory;
pub mod metadata_store;
pub mod ownership;
pub mod presign;

// Shared building blocks for the finance-model client: configuration,
// the persistent session store, and the wire types exchanged with the
// backend.

pub mod config;
pub mod protocol;
pub mod resources;
pub mod store;

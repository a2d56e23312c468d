// Authenticated client for the finance-model REST backend.
//
// `ApiClient` is the single point of contact with the backend: it builds
// headers, normalises failures into `ApiError`, and owns the session token
// lifecycle through `SessionManager`. The typed `Repository` layer and the
// line-item helpers sit on top of it.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod line_items;
pub mod repository;
pub mod session;
pub mod testing;
pub mod transport;

pub use client::ApiClient;
pub use error::{ApiError, ErrorKind};
pub use session::{SessionEvent, SessionManager};

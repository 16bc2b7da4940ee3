//! GateCheck server API boundary.
//!
//! The check-in server is abstracted as a generic request/response endpoint:
//! submit a check-in, pull the change feed, fetch the roster. The HTTP client
//! talks to a real deployment; the in-memory server implements the same
//! authoritative conflict contract for tests and offline development.

pub mod http;
pub mod memory;
pub mod server;

pub use http::HttpServerApi;
pub use memory::MemoryServer;
pub use server::{CheckinSubmission, ConflictReason, RemotePage, ServerApi, SubmitOutcome};

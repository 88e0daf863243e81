//! API module for functionality shared by the backend and its clients
//!
//! Contains ONLY framework-free code:
//! - Request/response types (serde)
//! - Credential hashing
//!
//! The backend wraps these with axum handlers; the client sends and
//! parses them with reqwest.

pub mod credentials;
pub mod types;

pub use credentials::{hash_password, verify_password};
pub use types::*;

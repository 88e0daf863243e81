//! # Sightline Common Library
//!
//! Shared code for the Sightline backend and client:
//! - Error type used across crates
//! - Configuration resolution (CLI → ENV → TOML → defaults)
//! - Database bootstrap and row models
//! - API request/response types shared by server and client
//! - Credential hashing

pub mod api;
pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};

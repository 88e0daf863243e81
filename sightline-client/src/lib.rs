//! # Sightline client
//!
//! Client-side logic for the Sightline backend:
//! - [`ApiClient`]: base URL fallback, session, typed endpoint calls
//! - [`upload`]: upload plus progress polling with spoken milestones
//! - [`voice`]: voice command grammar and dispatcher
//! - [`AppSettings`]: user preferences with a load/save lifecycle

pub mod client;
pub mod config;
pub mod error;
pub mod settings;
pub mod upload;
pub mod voice;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use settings::AppSettings;

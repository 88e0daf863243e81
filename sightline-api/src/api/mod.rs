//! HTTP API handlers

pub mod detection;
pub mod files;
pub mod health;
pub mod history;
pub mod root;
pub mod users;

pub use detection::detection_routes;
pub use health::health_routes;
pub use history::history_routes;
pub use root::root_routes;
pub use users::user_routes;

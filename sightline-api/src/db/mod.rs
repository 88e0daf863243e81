//! Database access for sightline-api
//!
//! Schema bootstrap lives in `sightline_common::db`; this module holds
//! the queries the HTTP layer and pipeline run.

pub mod history;
pub mod users;

/// True when a sqlx error is a UNIQUE constraint violation
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

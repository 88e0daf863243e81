//! User directory queries

use sightline_common::db::User;
use sightline_common::{Error, Result};
use sqlx::SqlitePool;

use super::is_unique_violation;

const USER_COLUMNS: &str = "id, username, email, password, language, created_at";

/// Fields for a new user; `password` is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub language: String,
}

/// Profile changes; `None` leaves the column untouched
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub language: Option<String>,
    pub password: Option<String>,
}

/// Insert a user, rejecting taken usernames and emails
pub async fn create_user(pool: &SqlitePool, new_user: &NewUser) -> Result<User> {
    ensure_username_free(pool, &new_user.username, None).await?;
    ensure_email_free(pool, &new_user.email, None).await?;

    let result = sqlx::query(
        "INSERT INTO users (username, email, password, language, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&new_user.username)
    .bind(&new_user.email)
    .bind(&new_user.password)
    .bind(&new_user.language)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await
    .map_err(|e| {
        // Lost a race with a concurrent signup
        if is_unique_violation(&e) {
            Error::Conflict("Username or email already registered".to_string())
        } else {
            Error::Database(e)
        }
    })?;

    let id = result.last_insert_rowid();
    tracing::debug!(user_id = id, "User row inserted");

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::Internal(format!("User {} vanished after insert", id)))
}

/// Load a user by id
pub async fn get_user(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(User::from_row).transpose()
}

/// Load a user whose username or email equals `identifier`
pub async fn find_by_identifier(pool: &SqlitePool, identifier: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM users WHERE username = ? OR email = ? \
         ORDER BY CASE WHEN username = ? THEN 0 ELSE 1 END LIMIT 1",
        USER_COLUMNS
    ))
    .bind(identifier)
    .bind(identifier)
    .bind(identifier)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(User::from_row).transpose()
}

/// Apply profile changes and return the updated user
pub async fn update_user(pool: &SqlitePool, id: i64, changes: &UserChanges) -> Result<User> {
    let current = get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))?;

    if let Some(username) = &changes.username {
        ensure_username_free(pool, username, Some(id)).await?;
    }
    if let Some(email) = &changes.email {
        ensure_email_free(pool, email, Some(id)).await?;
    }

    let username = changes.username.as_ref().unwrap_or(&current.username);
    let email = changes.email.as_ref().unwrap_or(&current.email);
    let language = changes.language.as_ref().unwrap_or(&current.language);
    let password = changes.password.as_ref().unwrap_or(&current.password);

    sqlx::query("UPDATE users SET username = ?, email = ?, language = ?, password = ? WHERE id = ?")
        .bind(username)
        .bind(email)
        .bind(language)
        .bind(password)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                Error::Conflict("Username or email already registered".to_string())
            } else {
                Error::Database(e)
            }
        })?;

    tracing::debug!(user_id = id, "User row updated");

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User not found: {}", id)))
}

async fn ensure_username_free(pool: &SqlitePool, username: &str, except: Option<i64>) -> Result<()> {
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    match taken {
        Some(owner) if Some(owner) != except => {
            Err(Error::Conflict("Username already registered".to_string()))
        }
        _ => Ok(()),
    }
}

async fn ensure_email_free(pool: &SqlitePool, email: &str, except: Option<i64>) -> Result<()> {
    let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    match taken {
        Some(owner) if Some(owner) != except => {
            Err(Error::Conflict("Email already registered".to_string()))
        }
        _ => Ok(()),
    }
}

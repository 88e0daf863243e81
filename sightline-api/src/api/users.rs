//! User directory endpoints
//!
//! POST /users/signup, POST /users/login, GET/PUT /users/{id}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sightline_common::api::{
    hash_password, verify_password, LoginRequest, SignupRequest, UpdateUserRequest, UserResponse,
};
use sightline_common::db::User;

use crate::db::users::{self, NewUser, UserChanges};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const DEFAULT_LANGUAGE: &str = "en";

pub fn to_response(user: &User) -> UserResponse {
    UserResponse {
        id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        language: user.language.clone(),
        created_at: user.created_at,
    }
}

fn required(field: &str, value: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(trimmed.to_string())
}

fn valid_email(value: &str) -> ApiResult<String> {
    let email = required("email", value)?;
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(ApiError::BadRequest(format!("Invalid email address: {}", email))),
    }
}

/// POST /users/signup
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let username = required("username", &request.username)?;
    let email = valid_email(&request.email)?;
    if request.password.is_empty() {
        return Err(ApiError::BadRequest("password must not be empty".to_string()));
    }
    let language = match request.language.as_deref() {
        Some(lang) => required("language", lang)?,
        None => DEFAULT_LANGUAGE.to_string(),
    };

    let user = users::create_user(
        &state.db,
        &NewUser {
            username,
            email,
            password: hash_password(&request.password)?,
            language,
        },
    )
    .await?;

    tracing::info!(user_id = user.id, username = %user.username, "User registered");
    Ok((StatusCode::CREATED, Json(to_response(&user))))
}

/// POST /users/login
///
/// Unknown identifier and wrong password get the same 401.
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<Json<UserResponse>> {
    let identifier = required("username", &request.identifier)?;

    let user = users::find_by_identifier(&state.db, &identifier).await?;
    match user {
        Some(user) if verify_password(&request.password, &user.password) => {
            tracing::debug!(user_id = user.id, "Login succeeded");
            Ok(Json(to_response(&user)))
        }
        _ => {
            tracing::debug!(identifier = %identifier, "Login rejected");
            Err(ApiError::Unauthorized(
                "Invalid username or password".to_string(),
            ))
        }
    }
}

/// GET /users/{id}
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<UserResponse>> {
    let user = users::get_user(&state.db, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("User not found: {}", user_id)))?;
    Ok(Json(to_response(&user)))
}

/// PUT /users/{id}
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    let changes = UserChanges {
        username: request
            .username
            .as_deref()
            .map(|v| required("username", v))
            .transpose()?,
        email: request.email.as_deref().map(valid_email).transpose()?,
        language: request
            .language
            .as_deref()
            .map(|v| required("language", v))
            .transpose()?,
        password: match request.password.as_deref() {
            Some("") => {
                return Err(ApiError::BadRequest("password must not be empty".to_string()))
            }
            Some(pw) => Some(hash_password(pw)?),
            None => None,
        },
    };

    let user = users::update_user(&state.db, user_id, &changes).await?;
    tracing::info!(user_id = user.id, "User profile updated");
    Ok(Json(to_response(&user)))
}

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/:id", get(get_user).put(update_user))
}

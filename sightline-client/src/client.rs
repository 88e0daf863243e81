//! HTTP client for the Sightline backend
//!
//! Requests go to the sticky base URL when there is one. A network-level
//! failure clears the sticky choice and walks the configured list from
//! the top; the first base that answers becomes sticky. HTTP error
//! statuses are answers, not network failures, and never trigger
//! fallback.

use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use sightline_common::api::{
    ConfigResponse, ErrorResponse, GenerateAudioResponse, HistoryItemResponse, LoginRequest,
    ProgressResponse, SignupRequest, StartDetectionResponse, UpdateUserRequest, UserResponse,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

const USER_AGENT: &str = concat!("sightline-client/", env!("CARGO_PKG_VERSION"));

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_urls: Arc<Vec<String>>,
    /// Index into `base_urls` of the base that last answered
    sticky: Arc<RwLock<Option<usize>>>,
    session: Arc<RwLock<Option<UserResponse>>>,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self::with_http(config, http))
    }

    /// Use a preconfigured reqwest client
    pub fn with_http(config: &ClientConfig, http: reqwest::Client) -> Self {
        Self {
            http,
            base_urls: Arc::new(config.base_urls.clone()),
            sticky: Arc::new(RwLock::new(None)),
            session: Arc::new(RwLock::new(None)),
        }
    }

    /// Base URL currently in use, if one has answered
    pub async fn current_base(&self) -> Option<String> {
        let sticky = *self.sticky.read().await;
        sticky.and_then(|i| self.base_urls.get(i).cloned())
    }

    /// Absolute URL for a server-relative path such as `/history/audio/3`
    pub async fn absolute_url(&self, path: &str) -> Option<String> {
        self.current_base().await.map(|base| format!("{}{}", base, path))
    }

    pub async fn session(&self) -> Option<UserResponse> {
        self.session.read().await.clone()
    }

    pub async fn logout(&self) {
        if let Some(user) = self.session.write().await.take() {
            info!(user_id = user.id, "Logged out");
        }
    }

    async fn require_user(&self) -> Result<UserResponse> {
        self.session().await.ok_or(ClientError::NoSession)
    }

    async fn send<F>(&self, build: F) -> Result<Response>
    where
        F: Fn(&reqwest::Client, &str) -> RequestBuilder,
    {
        let sticky = *self.sticky.read().await;
        if let Some(index) = sticky {
            let base = &self.base_urls[index];
            match build(&self.http, base).send().await {
                Ok(response) => return self.check(response).await,
                Err(e) if e.is_builder() => return Err(e.into()),
                Err(e) => {
                    warn!(base = %base, error = %e, "Backend unreachable, re-resolving");
                    *self.sticky.write().await = None;
                }
            }
        }

        let mut last_error = String::from("no base URLs configured");
        for (index, base) in self.base_urls.iter().enumerate() {
            match build(&self.http, base).send().await {
                Ok(response) => {
                    *self.sticky.write().await = Some(index);
                    info!(base = %base, "Using backend");
                    return self.check(response).await;
                }
                Err(e) if e.is_builder() => return Err(e.into()),
                Err(e) => {
                    debug!(base = %base, error = %e, "Backend candidate failed");
                    last_error = e.to_string();
                }
            }
        }

        Err(ClientError::Unreachable {
            tried: self.base_urls.len(),
            last: last_error,
        })
    }

    /// Turn non-2xx answers into errors carrying the server's message
    async fn check(&self, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(status, &body);

        if status == StatusCode::UNAUTHORIZED {
            if self.session.write().await.take().is_some() {
                warn!("Session rejected by server, cleared");
            }
            return Err(ClientError::Unauthorized(message));
        }
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .send(|http, base| http.get(format!("{}{}", base, path)))
            .await?;
        decode(response).await
    }

    // ========================================
    // Service
    // ========================================

    /// GET / liveness message
    pub async fn ping(&self) -> Result<String> {
        let body: serde_json::Value = self.get_json("/").await?;
        body["message"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Decode("missing message".to_string()))
    }

    pub async fn server_config(&self) -> Result<ConfigResponse> {
        self.get_json("/config").await
    }

    // ========================================
    // Users
    // ========================================

    pub async fn signup(&self, request: &SignupRequest) -> Result<UserResponse> {
        let response = self
            .send(|http, base| http.post(format!("{}/users/signup", base)).json(request))
            .await?;
        decode(response).await
    }

    /// Log in and keep the user as the session
    pub async fn login(&self, identifier: &str, password: &str) -> Result<UserResponse> {
        let request = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let response = self
            .send(|http, base| http.post(format!("{}/users/login", base)).json(&request))
            .await?;
        let user: UserResponse = decode(response).await?;

        info!(user_id = user.id, username = %user.username, "Logged in");
        *self.session.write().await = Some(user.clone());
        Ok(user)
    }

    pub async fn update_profile(&self, changes: &UpdateUserRequest) -> Result<UserResponse> {
        let user = self.require_user().await?;
        let response = self
            .send(|http, base| {
                http.put(format!("{}/users/{}", base, user.id))
                    .json(changes)
            })
            .await?;
        let updated: UserResponse = decode(response).await?;
        *self.session.write().await = Some(updated.clone());
        Ok(updated)
    }

    // ========================================
    // Detection
    // ========================================

    /// Upload media for background detection
    pub async fn start_detection(
        &self,
        file: &Path,
        language: Option<&str>,
    ) -> Result<StartDetectionResponse> {
        let user = self.require_user().await?;
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let language = language.map(str::to_string);

        debug!(file = %file.display(), size = bytes.len(), "Uploading media");
        let response = self
            .send(|http, base| {
                // Forms are single-use, so each attempt builds its own
                let mut form = Form::new()
                    .text("user_id", user.id.to_string())
                    .part("file", Part::bytes(bytes.clone()).file_name(file_name.clone()));
                if let Some(lang) = &language {
                    form = form.text("language", lang.clone());
                }
                http.post(format!("{}/detect/start", base)).multipart(form)
            })
            .await?;
        decode(response).await
    }

    pub async fn progress(&self, task_id: Uuid) -> Result<ProgressResponse> {
        self.get_json(&format!("/detect/progress/{}", task_id)).await
    }

    /// Narrate arbitrary lines; returns where to fetch the audio
    pub async fn generate_audio(
        &self,
        lines: &[String],
        language: &str,
    ) -> Result<GenerateAudioResponse> {
        let response = self
            .send(|http, base| {
                http.post(format!("{}/detect/generate-audio", base))
                    .query(&[("language", language)])
                    .json(lines)
            })
            .await?;
        decode(response).await
    }

    // ========================================
    // History
    // ========================================

    /// The session user's history, newest first
    pub async fn history(&self) -> Result<Vec<HistoryItemResponse>> {
        let user = self.require_user().await?;
        self.get_json(&format!("/history/{}", user.id)).await
    }

    pub async fn history_entry(&self, id: i64) -> Result<HistoryItemResponse> {
        self.get_json(&format!("/history/entry/{}", id)).await
    }

    pub async fn delete_entry(&self, id: i64) -> Result<()> {
        self.send(|http, base| http.delete(format!("{}/history/{}", base, id)))
            .await?;
        info!(history_id = id, "History entry deleted");
        Ok(())
    }

    /// Fetch a server-relative file such as an entry's `audio_url`
    pub async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .send(|http, base| http.get(format!("{}{}", base, path)))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Message text from an error body, falling back to the raw body or status
fn error_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        return parsed.error.message;
    }
    let body = body.trim();
    if !body.is_empty() {
        return body.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("Request failed")
        .to_string()
}

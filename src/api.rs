//! HTTP client for the TaskCard API
//!
//! Thin typed wrapper over reqwest. Every response is decoded here and every
//! failure is mapped onto [`ApiError`], so callers never look at raw status
//! codes or response bodies.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::ServerConfig;
use crate::models::{
    ApiEnvelope, CreateTaskRequest, ErrorBody, ErrorDetail, FavoriteResponse, LoginRequest,
    LoginResponse, Paginated, RegisterRequest, Task, TaskColor, UpdateTaskRequest, User,
};

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure taxonomy for TaskCard API calls
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("could not reach the server: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{}", .0.message.as_deref().unwrap_or("authentication required"))]
    Unauthorized(ErrorBody),
    /// 400 or 422 with per-field messages in the body
    #[error("{}", .1.message.as_deref().unwrap_or("validation failed"))]
    Validation(u16, ErrorBody),
    #[error("{}", .0.message.as_deref().unwrap_or("not found"))]
    NotFound(ErrorBody),
    #[error("server error (HTTP {0})")]
    Server(u16, ErrorBody),
    #[error("unexpected response from the server: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status behind this error, where one exists
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Network(_) | ApiError::Decode(_) => None,
            ApiError::Unauthorized(_) => Some(401),
            ApiError::NotFound(_) => Some(404),
            ApiError::Validation(status, _) | ApiError::Server(status, _) => Some(*status),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    /// Normalize into the uniform record kept in container state
    pub fn detail(&self) -> ErrorDetail {
        let (message, errors) = match self {
            ApiError::Network(err) if err.is_timeout() => {
                ("The server took too long to respond. Try again.".to_string(), None)
            }
            ApiError::Network(_) => {
                ("Could not reach the server. Check your connection.".to_string(), None)
            }
            ApiError::Unauthorized(body) => (
                body.message
                    .clone()
                    .unwrap_or_else(|| "You need to log in to do that.".to_string()),
                body.errors.clone(),
            ),
            ApiError::Validation(_, body) => (
                body.message
                    .clone()
                    .unwrap_or_else(|| "The server rejected the request.".to_string()),
                body.errors.clone(),
            ),
            ApiError::NotFound(body) => (
                body.message
                    .clone()
                    .unwrap_or_else(|| "The requested record was not found.".to_string()),
                body.errors.clone(),
            ),
            ApiError::Server(status, body) => (
                body.message
                    .clone()
                    .unwrap_or_else(|| format!("The server reported an error (HTTP {status}).")),
                body.errors.clone(),
            ),
            ApiError::Decode(err) => {
                (format!("Unexpected response from the server: {err}"), None)
            }
        };
        ErrorDetail {
            message,
            errors,
            status: self.status(),
        }
    }
}

fn status_error(status: StatusCode, body: ErrorBody) -> ApiError {
    match status.as_u16() {
        401 => ApiError::Unauthorized(body),
        404 => ApiError::NotFound(body),
        code @ (400 | 422) => ApiError::Validation(code, body),
        code => ApiError::Server(code, body),
    }
}

/// Decode a 2xx body as `T`, or map the error body onto [`ApiError`]
async fn parse<T: DeserializeOwned>(response: Response) -> ApiResult<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        return Err(status_error(status, body));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Like [`parse`], for endpoints whose success body we discard
async fn expect_ok(response: Response) -> ApiResult<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let text = response.text().await?;
    let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
    Err(status_error(status, body))
}

#[derive(Serialize)]
struct ListQuery<'a> {
    page: u32,
    per_page: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    search: Option<&'a str>,
}

/// Typed client for the TaskCard REST API
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(server: &ServerConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(server.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: server.base_url.trim_end_matches('/').to_string(),
            api_token: server.api_token.clone(),
            token: None,
        })
    }

    /// Session bearer token for authenticated requests
    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .header(header::ACCEPT, "application/json");
        if let Some(api_token) = &self.api_token {
            builder = builder.header("X-API-TOKEN", api_token);
        }
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    pub async fn login(&mut self, email: &str, password: &str) -> ApiResult<LoginResponse> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.request(Method::POST, "/login").json(&body).send().await?;
        let login: LoginResponse = parse(response).await?;
        self.token = Some(login.token.clone());
        Ok(login)
    }

    pub async fn register(&mut self, request: &RegisterRequest) -> ApiResult<LoginResponse> {
        let response = self
            .request(Method::POST, "/register")
            .json(request)
            .send()
            .await?;
        let login: LoginResponse = parse(response).await?;
        self.token = Some(login.token.clone());
        Ok(login)
    }

    /// Revoke the session server-side and forget the local token
    pub async fn logout(&mut self) -> ApiResult<()> {
        let response = self.request(Method::POST, "/logout").send().await?;
        let result = expect_ok(response).await;
        self.token = None;
        result
    }

    pub async fn current_user(&self) -> ApiResult<User> {
        let response = self.request(Method::GET, "/user").send().await?;
        let envelope: ApiEnvelope<User> = parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn list_tasks(
        &self,
        page: u32,
        per_page: u32,
        search: Option<&str>,
    ) -> ApiResult<Paginated<Task>> {
        let response = self
            .request(Method::GET, "/tasks")
            .query(&ListQuery {
                page,
                per_page,
                search,
            })
            .send()
            .await?;
        parse(response).await
    }

    pub async fn get_task(&self, id: i64) -> ApiResult<Task> {
        let response = self
            .request(Method::GET, &format!("/tasks/{id}"))
            .send()
            .await?;
        let envelope: ApiEnvelope<Task> = parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn create_task(&self, request: &CreateTaskRequest) -> ApiResult<Task> {
        let response = self
            .request(Method::POST, "/tasks")
            .json(request)
            .send()
            .await?;
        let envelope: ApiEnvelope<Task> = parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn update_task(&self, id: i64, request: &UpdateTaskRequest) -> ApiResult<Task> {
        let response = self
            .request(Method::PUT, &format!("/tasks/{id}"))
            .json(request)
            .send()
            .await?;
        let envelope: ApiEnvelope<Task> = parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn delete_task(&self, id: i64) -> ApiResult<()> {
        let response = self
            .request(Method::DELETE, &format!("/tasks/{id}"))
            .send()
            .await?;
        expect_ok(response).await
    }

    pub async fn list_favorites(&self, page: u32, per_page: u32) -> ApiResult<Paginated<Task>> {
        let response = self
            .request(Method::GET, "/tasks/favorites")
            .query(&ListQuery {
                page,
                per_page,
                search: None,
            })
            .send()
            .await?;
        parse(response).await
    }

    /// Returns the task's new favorite flag
    pub async fn toggle_favorite(&self, id: i64) -> ApiResult<bool> {
        let response = self
            .request(Method::POST, &format!("/tasks/{id}/favorite"))
            .send()
            .await?;
        let envelope: ApiEnvelope<FavoriteResponse> = parse(response).await?;
        Ok(envelope.data.is_favorited)
    }

    pub async fn list_colors(&self) -> ApiResult<Vec<TaskColor>> {
        let response = self
            .request(Method::GET, "/tasks/colors")
            .send()
            .await?;
        let envelope: ApiEnvelope<Vec<TaskColor>> = parse(response).await?;
        Ok(envelope.data)
    }

    pub async fn change_color(&self, id: i64, color_id: i64) -> ApiResult<Task> {
        let response = self
            .request(Method::PUT, &format!("/tasks/{id}/color/{color_id}"))
            .send()
            .await?;
        let envelope: ApiEnvelope<Task> = parse(response).await?;
        Ok(envelope.data)
    }
}

//! HTTP error envelope shared by every handler.
//!
//! All responses carry `{code, message}`; internal failures never leak detail.

use crate::auth::{account_store::CreateAccountError, service::AuthError};
use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, error};

/// Body of every non-2xx response, and of plain acknowledgements
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub code: u16,
    pub message: String,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            code: 200,
            message: message.into(),
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    InvalidCredentials,
    AccountBlocked,
    MissingAccessToken,
    MissingRefreshToken,
    InvalidAccessToken,
    RefreshTokenMismatch,
    Unauthorized,
    Forbidden,
    NotFound(&'static str),
    BadRequest(&'static str),
    Conflict(&'static str),
    /// Body missing, not JSON, or not the expected shape
    InvalidBody,
    InternalError,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidCredentials | ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccountBlocked | ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::MissingAccessToken
            | ApiError::MissingRefreshToken
            | ApiError::InvalidAccessToken
            | ApiError::RefreshTokenMismatch
            | ApiError::BadRequest(_)
            | ApiError::InvalidBody => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ApiError::InvalidCredentials => "Incorrect email or password",
            ApiError::AccountBlocked => "Account has been blocked",
            ApiError::MissingAccessToken => "Access token not found",
            ApiError::MissingRefreshToken => "Refresh token not found",
            ApiError::InvalidAccessToken => "Access token not valid",
            ApiError::RefreshTokenMismatch => "Refresh token not valid",
            ApiError::Unauthorized => "Unauthorized",
            ApiError::Forbidden => "You do not have permission to perform this action",
            ApiError::NotFound(msg) | ApiError::BadRequest(msg) | ApiError::Conflict(msg) => msg,
            ApiError::InvalidBody => "Invalid request body",
            ApiError::InternalError => "Internal Server Error",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::InvalidCredentials,
            AuthError::AccountBlocked => ApiError::AccountBlocked,
            AuthError::TokenDecodeFailure => ApiError::InvalidAccessToken,
            AuthError::RefreshTokenMismatch => ApiError::RefreshTokenMismatch,
            AuthError::Internal(e) => {
                error!(error = %e, "Auth operation failed");
                ApiError::InternalError
            }
        }
    }
}

impl From<CreateAccountError> for ApiError {
    fn from(err: CreateAccountError) -> Self {
        match err {
            CreateAccountError::DuplicateEmail => ApiError::Conflict("Email already exists"),
            CreateAccountError::Storage(e) => e.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!(error = %err, "Request failed");
        ApiError::InternalError
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = MessageResponse {
            code: status.as_u16(),
            message: self.message().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections use the `{code, message}` envelope
#[derive(Debug)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                debug!(reason = %rejection.body_text(), "Rejected request body");
                Err(ApiError::InvalidBody)
            }
        }
    }
}

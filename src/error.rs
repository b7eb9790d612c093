/*
 * Responsibility
 * - アプリ共通の AppError 定義 (認証・認可の失敗種別を含む)
 * - IntoResponse 実装 (HTTP status / JSON error body)
 * - 内部詳細は log にだけ残し、response には code と固定 message のみ載せる
 */
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("{code}: {message}")]
    BadRequest { code: &'static str, message: String },

    #[error("no authorization token provided")]
    NoAuthorizationProvided,

    #[error("invalid token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("user logged out")]
    UserLoggedOut,

    #[error("refresh token missing")]
    RefreshTokenMissing,

    #[error("refresh token expired")]
    RefreshTokenExpired,

    #[error("user not found")]
    UserNotFound,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("module not registered")]
    ModuleNotRegistered,

    #[error("no permission for this module")]
    NoModulePermission,

    #[error("no data access for this module")]
    NoDataAccess,

    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    #[error("not implemented")]
    NotImplemented,

    #[error("internal server error")]
    Internal,
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &'static str) -> Self {
        Self::NotFound { resource }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NoAuthorizationProvided
            | AppError::InvalidToken
            | AppError::TokenExpired
            | AppError::UserLoggedOut
            | AppError::RefreshTokenMissing
            | AppError::RefreshTokenExpired
            | AppError::UserNotFound
            | AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::NoModulePermission | AppError::NoDataAccess => StatusCode::FORBIDDEN,
            AppError::ModuleNotRegistered | AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            AppError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest { code, .. } => code,
            AppError::NoAuthorizationProvided => "NO_AUTHORIZATION_PROVIDED",
            AppError::InvalidToken => "INVALID_TOKEN",
            AppError::TokenExpired => "TOKEN_EXPIRED",
            AppError::UserLoggedOut => "USER_LOGGED_OUT",
            AppError::RefreshTokenMissing => "REFRESH_TOKEN_MISSING",
            AppError::RefreshTokenExpired => "REFRESH_TOKEN_EXPIRED",
            AppError::UserNotFound => "USER_NOT_FOUND",
            AppError::InvalidCredentials => "INVALID_CREDENTIALS",
            AppError::ModuleNotRegistered => "MODULE_NOT_REGISTERED",
            AppError::NoModulePermission => "NO_MODULE_PERMISSION",
            AppError::NoDataAccess => "NO_DATA_ACCESS",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::NotImplemented => "NOT_IMPLEMENTED",
            AppError::Internal => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let message = match self {
            AppError::BadRequest { message, .. } => message,
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: ErrorBody { code, message },
        };

        (status, Json(body)).into_response()
    }
}

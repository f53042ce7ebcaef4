//! API handlers module

pub mod analyses;
pub mod auth;
pub mod health;
pub mod patients;
pub mod uploads;
pub mod users;

use axum::{http::StatusCode, Json};
use medvault_common::errors::AppError;
use serde::Serialize;
use validator::Validate;

/// Success envelope; failures use the error body from `AppError`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

pub type Reply<T> = (StatusCode, Json<ApiResponse<T>>);

pub fn ok<T>(message: impl Into<String>, data: T) -> Reply<T> {
    reply(StatusCode::OK, message, Some(data))
}

pub fn created<T>(message: impl Into<String>, data: T) -> Reply<T> {
    reply(StatusCode::CREATED, message, Some(data))
}

pub fn done(message: impl Into<String>) -> Reply<()> {
    reply(StatusCode::OK, message, None)
}

fn reply<T>(status: StatusCode, message: impl Into<String>, data: Option<T>) -> Reply<T> {
    (
        status,
        Json(ApiResponse {
            success: true,
            message: message.into(),
            data,
        }),
    )
}

/// Run `validator` rules, reporting the first failing field
pub fn validate<T: Validate>(body: &T) -> Result<(), AppError> {
    body.validate().map_err(|e| {
        let field = e.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: e.to_string(),
            field,
        }
    })
}

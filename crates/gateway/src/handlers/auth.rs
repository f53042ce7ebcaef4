//! Login and session handlers

use axum::{extract::State, Json};
use medvault_common::{domain::User, errors::Result};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{ok, validate, Reply};
use crate::{extract::CurrentUser, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 256))]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub user: User,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Reply<LoginResponse>> {
    validate(&request)?;

    let (token, user) = state
        .services
        .identity
        .authenticate(&request.email, &request.password)
        .await?;

    Ok(ok(
        "Login successful",
        LoginResponse {
            token,
            token_type: "Bearer",
            expires_in: state.config.auth.jwt_expiration_secs,
            user,
        },
    ))
}

pub async fn me(CurrentUser(user): CurrentUser) -> Reply<User> {
    ok("Current user", user)
}

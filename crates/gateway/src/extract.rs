//! Request extractors

use axum::{extract::FromRequestParts, http::header::AUTHORIZATION, http::request::Parts};
use medvault_common::{auth::extract_bearer, domain::User, errors::AppError};

use crate::AppState;

/// The authenticated, active account behind a bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;
        let token = extract_bearer(header).ok_or(AppError::InvalidToken)?;

        let user = state.services.identity.user_for_token(token).await?;
        Ok(CurrentUser(user))
    }
}

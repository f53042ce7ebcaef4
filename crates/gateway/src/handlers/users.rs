//! Staff account handlers

use axum::{
    extract::{Path, State},
    Json,
};
use medvault_common::{
    domain::{Role, User},
    errors::Result,
    identity::NewUser,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::{created, done, ok, validate, Reply};
use crate::{extract::CurrentUser, AppState};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(min = 8, max = 256))]
    pub password: String,

    pub role: Role,

    #[serde(default)]
    pub assigned_senior_doctor: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    pub role: Role,
}

#[derive(Debug, Deserialize)]
pub struct ActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeniorRequest {
    pub senior_id: Uuid,
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Json(request): Json<CreateUserRequest>,
) -> Result<Reply<User>> {
    validate(&request)?;

    let user = state
        .services
        .identity
        .register_user(
            &requester,
            NewUser {
                email: request.email,
                name: request.name,
                password: request.password,
                role: request.role,
                assigned_senior_doctor: request.assigned_senior_doctor,
            },
        )
        .await?;
    Ok(created("User registered", user))
}

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
) -> Result<Reply<Vec<User>>> {
    let users = state.services.identity.list_users(&requester).await?;
    Ok(ok(format!("{} users", users.len()), users))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Reply<User>> {
    let user = state.services.identity.get_user(&requester, user_id).await?;
    Ok(ok("User found", user))
}

pub async fn change_role(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<RoleRequest>,
) -> Result<Reply<User>> {
    let user = state
        .services
        .identity
        .change_role(&requester, user_id, request.role)
        .await?;
    Ok(ok("Role updated", user))
}

pub async fn set_active(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ActiveRequest>,
) -> Result<Reply<User>> {
    let user = state
        .services
        .identity
        .set_active(&requester, user_id, request.is_active)
        .await?;
    let message = if user.is_active { "User activated" } else { "User deactivated" };
    Ok(ok(message, user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Reply<()>> {
    state.services.identity.delete_user(&requester, user_id).await?;
    Ok(done("User deleted"))
}

pub async fn assign_senior(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(request): Json<SeniorRequest>,
) -> Result<Reply<User>> {
    let user = state
        .services
        .identity
        .assign_senior(&requester, user_id, request.senior_id)
        .await?;
    Ok(ok("Senior doctor assigned", user))
}

pub async fn unassign_senior(
    State(state): State<AppState>,
    CurrentUser(requester): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> Result<Reply<User>> {
    let user = state
        .services
        .identity
        .unassign_consulting(&requester, user_id)
        .await?;
    Ok(ok("Senior doctor unassigned", user))
}

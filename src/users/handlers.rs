use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        extractors::AuthUser,
        password::hash_password,
        validate::{check_password, normalize_email, normalize_username},
    },
    error::AppError,
    state::AppState,
    users::{
        dto::{DeleteResponse, PublicUser, UpdatePasswordRequest, UpdateUserRequest},
        repo::{is_unique_violation, User},
    },
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/users/:id/password", put(update_password))
}

#[instrument(skip(state, _auth))]
pub async fn list_users(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = User::list(&state.db).await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state, _auth))]
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<PublicUser>, AppError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, _auth, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    let username = normalize_username(&payload.username)?;
    let email = normalize_email(&payload.email)?;

    // The new email may not belong to a different user
    if let Some(existing) = User::find_by_email(&state.db, &email).await? {
        if existing.id != id {
            warn!(email = %email, user_id = %id, "email in use by another user");
            return Err(AppError::Conflict("Email already in use by another user".into()));
        }
    }

    let user = match User::update_profile(&state.db, id, &username, &email).await {
        Ok(Some(u)) => u,
        Ok(None) => return Err(AppError::NotFound("User not found".into())),
        Err(e) if is_unique_violation(&e) => {
            warn!(email = %email, user_id = %id, "email in use by another user (concurrent)");
            return Err(AppError::Conflict("Email already in use by another user".into()));
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = %user.id, "user updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state, _auth, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<PublicUser>, AppError> {
    check_password(&payload.password)?;
    if payload.password != payload.confirm_password {
        return Err(AppError::Validation("Passwords must match".into()));
    }

    let hash = hash_password(&payload.password)?;

    let user = User::update_password(&state.db, id, &hash)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    info!(user_id = %user.id, "password updated");
    Ok(Json(user.into()))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, AppError> {
    if claims.sub == id {
        warn!(user_id = %id, "attempted self-deletion");
        return Err(AppError::Forbidden("You cannot delete your own account".into()));
    }

    if !User::delete(&state.db, id).await? {
        return Err(AppError::NotFound("User not found".into()));
    }

    info!(user_id = %id, deleted_by = %claims.sub, "user deleted");
    Ok(Json(DeleteResponse {
        message: "User deleted".into(),
    }))
}

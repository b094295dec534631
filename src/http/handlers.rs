//! REST handlers for `/api/users`.
//!
//! Each handler makes exactly one store call. On update, the id in the path
//! is authoritative; an `id` in the body is ignored.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::store::{User, UserFields};

pub async fn list_users(State(state): State<AppState>) -> Json<Vec<User>> {
    Json(state.store.list())
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<UserFields>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(fields) = payload?;
    let user = state.store.create(fields);
    tracing::info!(user_id = %user.id, "User created via REST");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UserFields>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Json(fields) = payload?;
    Ok(Json(state.store.update(&id, fields)?))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.store.delete(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

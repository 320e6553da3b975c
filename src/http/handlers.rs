//! Account and credential endpoints.
//!
//! Handlers are thin: parse the request, call the session gate, map the
//! outcome. Login and refresh accept their parameters in the query string on
//! both GET and POST.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::http::request::bearer_token;
use crate::http::response::ApiError;
use crate::http::server::AppState;
use crate::session::{AuthFailure, GateError};
use crate::users::{Profile, Registration, UserId};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    pub id: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenewalParams {
    pub refresh_token: Option<String>,
}

fn credential(headers: &HeaderMap) -> Result<&str, ApiError> {
    bearer_token(headers).ok_or_else(|| GateError::from(AuthFailure::Missing).into())
}

pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<Registration>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(registration) =
        payload.map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
    let user_id = state.gate.register(registration).await?;
    Ok((StatusCode::CREATED, Json(json!({ "user_id": user_id }))))
}

pub async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let token = credential(&headers)?;
    Ok(Json(state.gate.profile(token).await?))
}

/// Profiles of every peer connected right now.
pub async fn active(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Profile>>, ApiError> {
    state.gate.authenticate(credential(&headers)?)?;
    let peers = state.router.registry().snapshot();
    Ok(Json(state.gate.resolve_peers(peers).await?))
}

pub async fn login(
    State(state): State<AppState>,
    Query(params): Query<LoginParams>,
) -> Result<impl IntoResponse, ApiError> {
    let id: UserId = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("id is required"))?
        .parse()
        .map_err(|_| ApiError::bad_request("id must be numeric"))?;
    let password = params.password.unwrap_or_default();

    let pair = state.gate.login(id, &password).await?;
    Ok(Json(pair))
}

pub async fn refresh(
    State(state): State<AppState>,
    Query(params): Query<RenewalParams>,
) -> Result<impl IntoResponse, ApiError> {
    let token = params.refresh_token.unwrap_or_default();
    let grant = state.gate.refresh(&token).await?;
    Ok(Json(grant))
}

pub async fn logout(
    State(state): State<AppState>,
    Query(params): Query<RenewalParams>,
) -> Result<StatusCode, ApiError> {
    let token = params.refresh_token.unwrap_or_default();
    state.gate.logout(&token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let draining = state.shutdown.is_triggered();
    let status = if draining {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (
        status,
        Json(json!({
            "status": if draining { "draining" } else { "ok" },
            "connected_peers": state.router.registry().len(),
        })),
    )
}

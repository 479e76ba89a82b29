//! Signup and login endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::JsonBody;
use crate::error::AppResult;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn signup(
    State(state): State<AppState>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> AppResult<(StatusCode, Json<Value>)> {
    state
        .users
        .signup(&credentials.email, &credentials.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "user created" })),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(credentials): JsonBody<Credentials>,
) -> AppResult<Json<Value>> {
    let user = state
        .users
        .verify_credentials(&credentials.email, &credentials.password)
        .await?;
    let token = state.tokens.issue(&user.key)?;

    Ok(Json(json!({
        "userId": user.key,
        "token": token,
    })))
}

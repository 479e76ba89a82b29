//! Book endpoints.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::extract::{BookForm, CurrentUser, JsonBody, MaybeUser, PublicOrigin};
use crate::catalog::{BEST_RATING_LIMIT, Book};
use crate::error::AppResult;
use crate::server::AppState;
use crate::types::BookId;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default, alias = "grade")]
    pub rating: Value,
}

pub async fn list(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.catalog.list().await?))
}

pub async fn best_rating(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.catalog.top_rated(BEST_RATING_LIMIT).await?))
}

pub async fn get_one(
    State(state): State<AppState>,
    MaybeUser(viewer): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.catalog.get(&BookId::new(id)).await?;
    debug!(
        book_id = %book.id,
        viewer = viewer.as_ref().map(|v| v.user_id().as_str()).unwrap_or("anonymous"),
        "book fetched"
    );
    Ok(Json(book))
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PublicOrigin(origin): PublicOrigin,
    form: BookForm,
) -> AppResult<(StatusCode, Json<Value>)> {
    let book = state
        .catalog
        .create(&user, &form.payload, form.image, &origin)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "book created", "book": book })),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    PublicOrigin(origin): PublicOrigin,
    Path(id): Path<String>,
    form: BookForm,
) -> AppResult<Json<Book>> {
    let book = state
        .catalog
        .update(&BookId::new(id), &user, &form.payload, form.image, &origin)
        .await?;
    Ok(Json(book))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.catalog.remove(&BookId::new(id), &user).await?;
    Ok(Json(json!({ "message": "book deleted" })))
}

pub async fn rate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<RatingRequest>,
) -> AppResult<Json<Value>> {
    let book = state
        .catalog
        .add_rating(&BookId::new(id), &user, body.user_id.as_deref(), &body.rating)
        .await?;

    Ok(Json(json!({ "message": "rating added", "book": book })))
}

// HTTP surface for the catalog

mod auth;
mod books;
mod extract;
#[cfg(test)]
mod tests;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    response::Json,
    routing::{get, post},
};
use serde_json::Value;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::images::IMAGES_ROUTE;
use crate::server::AppState;

pub fn router(state: AppState) -> Router {
    // Identity is attached on the API only; static images stay public.
    let api = Router::new()
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/books", get(books::list).post(books::create))
        .route("/books/bestrating", get(books::best_rating))
        .route(
            "/books/{id}",
            get(books::get_one).put(books::update).delete(books::remove),
        )
        .route("/books/{id}/rating", post(books::rate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            extract::attach_identity,
        ));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .nest_service(IMAGES_ROUTE, ServeDir::new(&state.config.images_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(state.config.max_upload_bytes)),
        )
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

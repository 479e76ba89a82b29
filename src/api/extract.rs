//! Request extractors and the identity middleware.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, FromRequest, FromRequestParts, Multipart, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::UserContext;
use crate::catalog::{BookField, BookPayload};
use crate::error::{AppError, AppResult};
use crate::images::ImageUpload;
use crate::server::AppState;

/// Multipart field carrying the cover image.
const IMAGE_FIELD: &str = "image";
/// Multipart field carrying the book document.
const BOOK_FIELD: &str = "book";

/// Attach the caller's identity when the request carries a valid bearer
/// token. Anonymous requests pass through; a bad token is rejected here.
pub async fn attach_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let headers = request.headers();
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let ip_address = client_ip(headers).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if let Some(user) = state
        .gate
        .extract_user(authorization, ip_address, user_agent)?
    {
        request.extensions_mut().insert(user);
    }

    Ok(next.run(request).await)
}

fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty())
}

/// The authenticated caller. Rejects anonymous requests with 401.
pub struct CurrentUser(pub UserContext);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<UserContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or_else(|| AppError::Unauthenticated("authentication required".to_string()))
    }
}

/// The caller's identity if one was attached.
pub struct MaybeUser(pub Option<UserContext>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(parts.extensions.get::<UserContext>().cloned()))
    }
}

/// Public origin (`scheme://host`) used to build image URLs.
///
/// A configured public URL wins. Otherwise the scheme comes from
/// `X-Forwarded-Proto` (default `http`) and the host from the `Host` header.
pub struct PublicOrigin(pub String);

impl FromRequestParts<AppState> for PublicOrigin {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(base) = &state.config.public_base_url {
            return Ok(PublicOrigin(base.trim_end_matches('/').to_string()));
        }

        let scheme = header_str(&parts.headers, "x-forwarded-proto")
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("http");
        let host = header_str(&parts.headers, header::HOST.as_str())
            .or_else(|| parts.uri.authority().map(|a| a.as_str()))
            .unwrap_or("localhost");

        Ok(PublicOrigin(format!("{}://{}", scheme, host)))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// JSON body whose rejections use the service's error format.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AppError::validation(e.body_text()))?;
        Ok(JsonBody(value))
    }
}

/// A book payload plus an optional cover upload.
///
/// Accepts `multipart/form-data` (a `book` field holding JSON, or flat text
/// fields, plus an optional `image` file) or an `application/json` body.
pub struct BookForm {
    pub payload: BookPayload,
    pub image: Option<ImageUpload>,
}

impl<S: Send + Sync> FromRequest<S> for BookForm {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = header_str(req.headers(), header::CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            return Self::from_multipart(multipart).await;
        }

        if content_type.starts_with("application/json") {
            let JsonBody(value) = JsonBody::<Value>::from_request(req, state).await?;
            return Ok(BookForm {
                payload: BookPayload::from_value(&value)?,
                image: None,
            });
        }

        Err(AppError::validation(
            "expected a multipart/form-data or application/json body",
        ))
    }
}

impl BookForm {
    async fn from_multipart(mut multipart: Multipart) -> AppResult<Self> {
        let mut book = None;
        let mut text_fields = Vec::new();
        let mut image = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::validation(e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == IMAGE_FIELD || field.file_name().is_some() {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::validation(e.body_text()))?;
                if !bytes.is_empty() {
                    image = Some(ImageUpload {
                        filename,
                        content_type,
                        bytes: bytes.to_vec(),
                    });
                }
                continue;
            }

            let text = field
                .text()
                .await
                .map_err(|e| AppError::validation(e.body_text()))?;
            if name == BOOK_FIELD {
                book = Some(BookField::Encoded(text));
            } else {
                text_fields.push((name, text));
            }
        }

        let payload = match book {
            Some(book) => BookPayload::from_field(book)?,
            None => BookPayload::from_text_fields(
                text_fields.iter().map(|(k, v)| (k.as_str(), v.as_str())),
            )?,
        };

        Ok(BookForm { payload, image })
    }
}

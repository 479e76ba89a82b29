use std::io::Cursor;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use super::router;
use crate::config::AppConfig;
use crate::db::DatabaseConfig;
use crate::server::AppState;

const BOUNDARY: &str = "grimoire-test-boundary";
const HOST: &str = "books.test";

struct TestApp {
    router: Router,
    dir: TempDir,
}

async fn app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let state = AppState::init(AppConfig::for_tests(dir.path()), DatabaseConfig::memory())
        .await
        .unwrap();
    TestApp {
        router: router(state),
        dir,
    }
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    /// Sign up and log in; returns (token, user id).
    async fn login(&self, email: &str) -> (String, String) {
        let credentials = json!({ "email": email, "password": "pw" });
        let (status, _) = self.send(json_request("POST", "/api/auth/signup", None, &credentials)).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self.send(json_request("POST", "/api/auth/login", None, &credentials)).await;
        assert_eq!(status, StatusCode::OK);
        (
            body["token"].as_str().unwrap().to_string(),
            body["userId"].as_str().unwrap().to_string(),
        )
    }

    async fn create_book(&self, token: &str, book: Value) -> (StatusCode, Value) {
        self.send(multipart_request(
            "POST",
            "/api/books",
            Some(token),
            Some(&book.to_string()),
            Some(png()),
        ))
        .await
    }
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header(header::HOST, HOST);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

fn delete(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .header(header::HOST, HOST)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

fn multipart_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    book: Option<&str>,
    image: Option<Vec<u8>>,
) -> Request<Body> {
    let mut body = Vec::new();
    if let Some(book) = book {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"book\"\r\n\r\n{}\r\n",
                BOUNDARY, book
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"My Cover.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(&image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}

fn png() -> Vec<u8> {
    png_colored(10)
}

fn png_colored(red: u8) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(32, 48, Rgb([red, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn sample_book() -> Value {
    json!({ "title": "A", "author": "B", "year": 2000, "genre": "G", "ratings": 4 })
}

#[tokio::test]
async fn test_health() {
    let app = app().await;
    let (status, body) = app.send(get("/health", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_signup_and_login() {
    let app = app().await;
    let (token, user_id) = app.login("reader@example.com").await;
    assert!(!token.is_empty());
    assert!(!user_id.is_empty());

    let duplicate = json!({ "email": "Reader@example.com", "password": "other" });
    let (status, body) = app
        .send(json_request("POST", "/api/auth/signup", None, &duplicate))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "conflict");

    let wrong = json!({ "email": "reader@example.com", "password": "nope" });
    let (status, _) = app.send(json_request("POST", "/api/auth/login", None, &wrong)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .send(json_request("POST", "/api/auth/signup", None, &json!({ "email": "x@y.z" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_anonymous_create_is_rejected() {
    let app = app().await;
    let (status, body) = app
        .send(multipart_request(
            "POST",
            "/api/books",
            None,
            Some(&sample_book().to_string()),
            Some(png()),
        ))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthenticated");
}

#[tokio::test]
async fn test_bad_token_is_rejected_even_on_reads() {
    let app = app().await;
    let (status, _) = app.send(get("/api/books", Some("garbage"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send(get("/api/books", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_create_and_fetch_anonymously() {
    let app = app().await;
    let (token, user_id) = app.login("owner@example.com").await;

    let (status, body) = app.create_book(&token, sample_book()).await;
    assert_eq!(status, StatusCode::CREATED);
    let book = &body["book"];
    assert_eq!(book["averageRating"], 4.0);
    assert_eq!(book["ratings"], json!([{ "userId": user_id, "grade": 4.0 }]));
    assert_eq!(book["ownerId"], user_id);

    let image_url = book["imageUrl"].as_str().unwrap();
    let prefix = format!("http://{}/images/", HOST);
    assert!(image_url.starts_with(&prefix), "{}", image_url);
    let filename = image_url.trim_start_matches(&prefix);
    assert!(filename.starts_with("my_cover_") && filename.ends_with(".webp"));
    assert!(app.dir.path().join(filename).exists());

    let id = book["id"].as_str().unwrap();
    let (status, fetched) = app.send(get(&format!("/api/books/{}", id), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&fetched, book);

    let response = app
        .router
        .clone()
        .oneshot(get(&format!("/images/{}", filename), None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_create_validation() {
    let app = app().await;
    let (token, _) = app.login("owner@example.com").await;

    let (status, body) = app
        .create_book(&token, json!({ "title": "A", "author": "B", "genre": "G" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("year"));

    let (status, _) = app
        .send(multipart_request("POST", "/api/books", Some(&token), Some("{not json"), Some(png())))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(multipart_request(
            "POST",
            "/api/books",
            Some(&token),
            Some(&sample_book().to_string()),
            Some(b"not an image".to_vec()),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, list) = app.send(get("/api/books", None)).await;
    assert_eq!(list, json!([]));
}

#[tokio::test]
async fn test_rating_flow() {
    let app = app().await;
    let (owner, _) = app.login("owner@example.com").await;
    let (reader, reader_id) = app.login("reader@example.com").await;

    let (_, body) = app.create_book(&owner, sample_book()).await;
    let id = body["book"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/books/{}/rating", id);

    let (status, body) = app
        .send(json_request("POST", &uri, Some(&reader), &json!({ "userId": reader_id, "rating": 2 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["averageRating"], 3.0);

    let (status, _) = app
        .send(json_request("POST", &uri, Some(&reader), &json!({ "rating": 5 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(json_request("POST", &uri, Some(&owner), &json!({ "rating": 5.1 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(json_request("POST", &uri, Some(&owner), &json!({ "userId": reader_id, "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(json_request("POST", "/api/books/missing/rating", Some(&owner), &json!({ "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .send(json_request("POST", &uri, None, &json!({ "rating": 1 })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_shapes_and_ownership() {
    let app = app().await;
    let (owner, _) = app.login("owner@example.com").await;
    let (other, _) = app.login("other@example.com").await;

    let (_, body) = app.create_book(&owner, sample_book()).await;
    let original = body["book"].clone();
    let uri = format!("/api/books/{}", original["id"].as_str().unwrap());

    let (status, _) = app
        .send(json_request("PUT", &uri, Some(&other), &json!({ "title": "Stolen" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Flat JSON body
    let (status, updated) = app
        .send(json_request("PUT", &uri, Some(&owner), &json!({ "title": "A2" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["title"], "A2");
    assert_eq!(updated["author"], "B");
    assert_eq!(updated["imageUrl"], original["imageUrl"]);

    // Nested object with a ratings list
    let (status, updated) = app
        .send(json_request(
            "PUT",
            &uri,
            Some(&owner),
            &json!({ "book": { "genre": "H", "ratings": [] } }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["genre"], "H");
    assert_eq!(updated["ratings"], json!([]));
    assert_eq!(updated["averageRating"], 0.0);

    // Multipart with a new cover releases the old file
    let old_file = original["imageUrl"]
        .as_str()
        .unwrap()
        .rsplit('/')
        .next()
        .unwrap()
        .to_string();
    let (status, updated) = app
        .send(multipart_request(
            "PUT",
            &uri,
            Some(&owner),
            Some(r#"{"year": "1999"}"#),
            Some(png_colored(250)),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["year"], 1999);
    assert_ne!(updated["imageUrl"], original["imageUrl"]);
    assert!(!app.dir.path().join(&old_file).exists());

    let (status, _) = app
        .send(json_request("PUT", "/api/books/missing", Some(&owner), &json!({ "title": "X" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete() {
    let app = app().await;
    let (owner, _) = app.login("owner@example.com").await;
    let (other, _) = app.login("other@example.com").await;

    let (_, body) = app.create_book(&owner, sample_book()).await;
    let book = body["book"].clone();
    let uri = format!("/api/books/{}", book["id"].as_str().unwrap());
    let file = book["imageUrl"].as_str().unwrap().rsplit('/').next().unwrap().to_string();

    let (status, _) = app.send(delete(&uri, &other)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send(delete(&uri, &owner)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "book deleted");
    assert!(!app.dir.path().join(&file).exists());

    let (status, _) = app.send(get(&uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(delete(&uri, &owner)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_best_rating() {
    let app = app().await;
    let (owner, _) = app.login("owner@example.com").await;

    for grade in [1, 5, 3, 2, 4] {
        let mut book = sample_book();
        book["title"] = json!(format!("graded {}", grade));
        book["ratings"] = json!(grade);
        let (status, _) = app.create_book(&owner, book).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.send(get("/api/books/bestrating", None)).await;
    assert_eq!(status, StatusCode::OK);
    let averages: Vec<f64> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["averageRating"].as_f64().unwrap())
        .collect();
    assert_eq!(averages, vec![5.0, 4.0, 3.0]);
}

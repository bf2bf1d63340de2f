//! HTTP handlers for image operations.
//!
//! Each handler maps the request onto a canonical [`Operation`], hands it to
//! the dispatcher, and renders the [`Outcome`].

use crate::{
    errors::AppError,
    models::{
        image::{CustomMetadata, ImageRecord},
        operation::{
            DeleteRequest, ImageView, ListRequest, Operation, Outcome, UploadRequest, ViewRequest,
        },
    },
    state::AppState,
};
use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DEFAULT_CONTENT_TYPE: &str = "image/jpeg";

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    /// JSON object of scalar annotations.
    pub metadata: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub content_type: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ViewQuery {
    pub download: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    pub expires: i64,
    pub signature: String,
}

/// `POST /images/upload`
pub async fn upload_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<Outcome, AppError> {
    let owner_id = header_str(&headers, USER_ID_HEADER).unwrap_or_default();
    let content_type = header_str(&headers, header::CONTENT_TYPE.as_str())
        .filter(|ct| !ct.is_empty())
        .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
    let custom_metadata = parse_custom_metadata(q.metadata.as_deref())?;

    let op = Operation::Upload(UploadRequest {
        owner_id,
        content_type,
        payload: body,
        filename: q.filename,
        custom_metadata,
    });
    Ok(state.dispatcher.dispatch(op).await?)
}

/// `GET /images?user_id=&content_type=&limit=`
pub async fn list_images(
    State(state): State<AppState>,
    Query(q): Query<ListQuery>,
) -> Result<Outcome, AppError> {
    let op = Operation::List(ListRequest {
        owner_id: q.user_id,
        content_type: q.content_type,
        limit: q.limit,
    });
    Ok(state.dispatcher.dispatch(op).await?)
}

/// `GET /images/{image_id}?download=true`
pub async fn view_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    Query(q): Query<ViewQuery>,
) -> Result<Outcome, AppError> {
    let want_download_link = q
        .download
        .as_deref()
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    let op = Operation::View(ViewRequest {
        image_id,
        want_download_link,
    });
    Ok(state.dispatcher.dispatch(op).await?)
}

/// `DELETE /images/{image_id}`, caller identified by `X-User-Id`.
pub async fn delete_image(
    State(state): State<AppState>,
    Path(image_id): Path<String>,
    headers: HeaderMap,
) -> Result<Outcome, AppError> {
    let op = Operation::Delete(DeleteRequest {
        image_id,
        caller_owner_id: header_str(&headers, USER_ID_HEADER),
    });
    Ok(state.dispatcher.dispatch(op).await?)
}

/// `GET /blobs/{*key}?expires=&signature=`, the target of presigned links.
pub async fn get_presigned_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<BlobQuery>,
) -> Result<Response, AppError> {
    state
        .local_blobs
        .signer()
        .verify(&key, q.expires, &q.signature, Utc::now())?;

    let blob = state.local_blobs.open(&key).await?;
    let mut response = Response::new(Body::from_stream(ReaderStream::new(blob.file)));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&blob.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.len));
    Ok(response)
}

impl IntoResponse for Outcome {
    fn into_response(self) -> Response {
        match self {
            Outcome::Uploaded(record) => (StatusCode::CREATED, Json(record)).into_response(),
            Outcome::Listed(list) => Json(list).into_response(),
            Outcome::Viewed(ImageView::Link { record, link }) => Json(json!({
                "image_id": record.image_id,
                "presigned_url": link.url,
                "expires_at": link.expires_at,
                "metadata": record,
            }))
            .into_response(),
            Outcome::Viewed(ImageView::Content { record, bytes }) => {
                let mut response = Response::new(Body::from(bytes));
                set_image_headers(response.headers_mut(), &record);
                response
            }
            Outcome::Deleted(confirmation) => Json(json!({
                "message": "Image deleted successfully",
                "image_id": confirmation.image_id,
            }))
            .into_response(),
        }
    }
}

fn set_image_headers(headers: &mut HeaderMap, record: &ImageRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&record.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size_bytes));

    let filename = record.filename.replace(['"', '\\'], "_");
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("inline; filename=\"{}\"", filename))
            .unwrap_or_else(|_| HeaderValue::from_static("inline")),
    );
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

fn parse_custom_metadata(raw: Option<&str>) -> Result<Option<CustomMetadata>, AppError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => serde_json::from_str::<CustomMetadata>(raw)
            .map(Some)
            .map_err(|err| AppError::bad_request(format!("Invalid metadata: {}", err))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        routes::routes::routes,
        services::{
            blob_store::LocalBlobStore,
            dispatcher::Dispatcher,
            memory::InMemoryMetadataStore,
            presign::UrlSigner,
        },
    };
    use axum::{Router, http::Request};
    use chrono::Duration;
    use serde_json::Value;
    use std::{sync::Arc, time::Duration as StdDuration};
    use tower::util::ServiceExt;
    use uuid::Uuid;

    const JPEG: &[u8] = b"\xff\xd8\xff\xe0\x00\x10JFIF\x00\x01\x01\x01\x00H\x00H\x00\x00\xff\xd9";

    fn app() -> Router {
        let dir = std::env::temp_dir().join(format!("image-service-http-{}", Uuid::new_v4()));
        let local_blobs = Arc::new(LocalBlobStore::new(
            dir,
            UrlSigner::new(b"test-secret".to_vec(), "http://localhost:3000").unwrap(),
            StdDuration::from_secs(5),
        ));
        let dispatcher = Dispatcher::new(
            local_blobs.clone(),
            Arc::new(InMemoryMetadataStore::new()),
            Duration::hours(1),
        );
        routes().with_state(AppState {
            dispatcher,
            local_blobs,
        })
    }

    async fn send(app: &Router, req: Request<Body>) -> Response {
        app.clone().oneshot(req).await.unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    fn upload(user: Option<&str>, uri: &str, body: &'static [u8]) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "image/jpeg");
        if let Some(user) = user {
            builder = builder.header("X-User-Id", user);
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn delete(id: &str, user: &str) -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri(format!("/images/{id}"))
            .header("X-User-Id", user)
            .body(Body::empty())
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn upload_returns_created_record() {
        let app = app();
        let response = send(
            &app,
            upload(
                Some("user123"),
                "/images/upload?filename=test.jpg&metadata=%7B%22description%22%3A%22Test%22%7D",
                JPEG,
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = body_json(response).await;
        assert_eq!(body["owner_id"], "user123");
        assert_eq!(body["filename"], "test.jpg");
        assert_eq!(body["size_bytes"], JPEG.len());
        assert_eq!(body["custom_metadata"]["description"], "Test");
        assert!(body["image_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn upload_without_user_is_bad_request() {
        let app = app();
        let response = send(&app, upload(None, "/images/upload", JPEG)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_with_invalid_metadata_is_bad_request() {
        let app = app();
        let response = send(
            &app,
            upload(Some("u1"), "/images/upload?metadata=not-json", JPEG),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().starts_with("Invalid metadata"));
    }

    #[tokio::test]
    async fn list_applies_filters() {
        let app = app();
        for user in ["alice", "bob", "alice"] {
            send(&app, upload(Some(user), "/images/upload", JPEG)).await;
        }

        let response = send(&app, get("/images?user_id=alice&limit=10")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 2);
        assert_eq!(body["images"].as_array().unwrap().len(), 2);

        let response = send(&app, get("/images?limit=5000")).await;
        assert_eq!(body_json(response).await["count"], 3);
    }

    #[tokio::test]
    async fn scenario_upload_view_forbidden_delete_then_gone() {
        let app = app();
        let created = body_json(
            send(&app, upload(Some("u1"), "/images/upload?filename=a.png", JPEG)).await,
        )
        .await;
        let id = created["image_id"].as_str().unwrap().to_string();

        let response = send(&app, get(&format!("/images/{id}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "inline; filename=\"a.png\""
        );
        assert_eq!(&body_bytes(response).await[..], JPEG);

        let response = send(&app, delete(&id, "u2")).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&app, delete(&id, "u1")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["image_id"], id);

        let response = send(&app, get(&format!("/images/{id}"))).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn download_link_serves_blob_until_tampered() {
        let app = app();
        let created = body_json(
            send(&app, upload(Some("u1"), "/images/upload?filename=a.jpg", JPEG)).await,
        )
        .await;
        let id = created["image_id"].as_str().unwrap();

        let response = send(&app, get(&format!("/images/{id}?download=true"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["image_id"], id);
        assert_eq!(body["metadata"]["owner_id"], "u1");

        let url = body["presigned_url"].as_str().unwrap();
        let path = url.strip_prefix("http://localhost:3000").unwrap();
        let response = send(&app, get(path)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(&body_bytes(response).await[..], JPEG);

        let tampered = path.replace("signature=", "signature=AAAA");
        let response = send(&app, get(&tampered)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn view_unknown_image_is_not_found() {
        let app = app();
        let response = send(&app, get("/images/does-not-exist")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"], "Image not found");
    }
}

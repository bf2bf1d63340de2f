//! Defines routes for all image operations.
//!
//! ## Structure
//! - `POST   /images/upload`      upload an image (owner from `X-User-Id`)
//! - `GET    /images`             list images (`user_id`, `content_type`, `limit`)
//! - `GET    /images/{image_id}`  view bytes, or `?download=true` for a link
//! - `DELETE /images/{image_id}`  delete (owner only)
//! - `GET    /blobs/{*key}`       presigned download target
//! - `GET    /healthz`, `/readyz` probes

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{delete_image, get_presigned_blob, list_images, upload_image, view_image},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. Handlers share [`AppState`].
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/images", get(list_images))
        .route("/images/upload", post(upload_image))
        .route("/images/{image_id}", get(view_image).delete(delete_image))
        .route("/blobs/{*key}", get(get_presigned_blob))
}

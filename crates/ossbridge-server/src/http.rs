//! Administrative HTTP API.
//!
//! Every response uses the same JSON envelope: `result` carries the
//! payload, `success` flags the outcome and `error` holds a code, a
//! message and the underlying detail on failure.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use ossbridge_core::{CopyReport, FileInfo, FsError, FsHandler};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Default lifetime, in minutes, of URLs signed for a shared listing.
const DEFAULT_LIST_EXPIRE_MINS: u64 = 10;
/// Default lifetime, in minutes, of an explicitly shared URL.
const DEFAULT_SHARE_EXPIRE_MINS: u64 = 20;

pub async fn serve(addr: SocketAddr, fs: Arc<FsHandler>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("admin api listening on {addr}");
    axum::serve(listener, router(fs)).await?;
    Ok(())
}

pub fn router(fs: Arc<FsHandler>) -> Router {
    Router::new()
        .route("/api/v1/", get(health))
        .route("/api/v1/sftp/", get(list_root).delete(delete_root))
        .route("/api/v1/sftp/{*path}", get(list_path).delete(delete_path))
        .route("/api/v1/share/{*path}", get(share))
        .route("/api/v1/copy", put(copy))
        .with_state(fs)
}

#[derive(Debug, Serialize)]
struct Envelope<T> {
    result: T,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ApiError>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    code: u32,
    msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn ok<T: Serialize>(result: T) -> Json<Envelope<T>> {
    Json(Envelope {
        result,
        success: true,
        error: None,
    })
}

/// Handler error; renders as the failure envelope.
#[derive(Debug)]
struct AppError(FsError);

impl From<FsError> for AppError {
    fn from(err: FsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, msg) = match &self.0 {
            FsError::NotFound(_) => (StatusCode::NOT_FOUND, 10008, "Parameter error"),
            FsError::AlreadyExists(_) | FsError::InvalidOperation(_) | FsError::Protocol(_) => {
                (StatusCode::BAD_REQUEST, 10008, "Parameter error")
            }
            FsError::Backend(err) => {
                error!(error = %err, "object store failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    10010,
                    "sftp internal error",
                )
            }
        };
        let body = Envelope {
            result: serde_json::Value::Null,
            success: false,
            error: Some(ApiError {
                code,
                msg: msg.to_string(),
                details: Some(self.0.to_string()),
            }),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    /// Any non-empty value requests signed URLs in the listing.
    share: Option<String>,
    recursive: Option<bool>,
    /// URL lifetime in minutes.
    expire: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ShareQuery {
    /// URL lifetime in minutes.
    expire: Option<u64>,
}

async fn health() -> Json<Envelope<&'static str>> {
    ok("request success")
}

async fn list_root(
    State(fs): State<Arc<FsHandler>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<BTreeMap<String, FileInfo>>>, AppError> {
    list_at(&fs, "/", query).await
}

async fn list_path(
    State(fs): State<Arc<FsHandler>>,
    Path(path): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<BTreeMap<String, FileInfo>>>, AppError> {
    list_at(&fs, &path, query).await
}

async fn list_at(
    fs: &FsHandler,
    path: &str,
    query: ListQuery,
) -> Result<Json<Envelope<BTreeMap<String, FileInfo>>>, AppError> {
    let share_expiry = query
        .share
        .filter(|s| !s.is_empty())
        .map(|_| Duration::from_secs(query.expire.unwrap_or(DEFAULT_LIST_EXPIRE_MINS) * 60));
    let records = fs
        .list_files(path, query.recursive.unwrap_or(false), share_expiry)
        .await?;
    Ok(ok(records))
}

async fn delete_root(
    State(fs): State<Arc<FsHandler>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<usize>>, AppError> {
    Ok(ok(fs.delete_files("/", query.recursive.unwrap_or(false)).await?))
}

async fn delete_path(
    State(fs): State<Arc<FsHandler>>,
    Path(path): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Envelope<usize>>, AppError> {
    Ok(ok(fs.delete_files(&path, query.recursive.unwrap_or(false)).await?))
}

async fn share(
    State(fs): State<Arc<FsHandler>>,
    Path(path): Path<String>,
    Query(query): Query<ShareQuery>,
) -> Result<Json<Envelope<String>>, AppError> {
    let expiry = Duration::from_secs(query.expire.unwrap_or(DEFAULT_SHARE_EXPIRE_MINS) * 60);
    Ok(ok(fs.signed_url(&path, expiry).await?))
}

#[derive(Debug, Deserialize)]
struct CopyPayload {
    paths: Vec<CopyPair>,
}

#[derive(Debug, Deserialize)]
struct CopyPair {
    src: String,
    dst: String,
}

async fn copy(
    State(fs): State<Arc<FsHandler>>,
    Json(payload): Json<CopyPayload>,
) -> Json<Envelope<CopyReport>> {
    let pairs: Vec<(String, String)> = payload
        .paths
        .into_iter()
        .map(|p| (p.src, p.dst))
        .collect();
    ok(fs.copy_objects(&pairs).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ossbridge_core::MemoryStore;

    async fn handler() -> Arc<FsHandler> {
        let store = Arc::new(MemoryStore::new());
        store.insert("a/", b"".to_vec()).await;
        store.insert("a/b.txt", b"0123456789".to_vec()).await;
        Arc::new(FsHandler::new(store))
    }

    #[test]
    fn success_envelope_shape() {
        let json = serde_json::to_value(ok("request success").0).unwrap();
        assert_eq!(json["result"], "request success");
        assert_eq!(json["success"], true);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn failure_envelope_carries_code_message_and_details() {
        let body = Envelope {
            result: serde_json::Value::Null,
            success: false,
            error: Some(ApiError {
                code: 10008,
                msg: "Parameter error".to_string(),
                details: Some("not found: /x".to_string()),
            }),
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], 10008);
        assert_eq!(json["error"]["details"], "not found: /x");
    }

    #[tokio::test]
    async fn missing_path_maps_to_404() {
        let fs = handler().await;
        let err = fs
            .signed_url("/nope", Duration::from_secs(60))
            .await
            .unwrap_err();
        let response = AppError(err).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_target_maps_to_400() {
        let fs = handler().await;
        fs.list("/").await.unwrap();
        let err = fs.signed_url("/a", Duration::from_secs(60)).await.unwrap_err();
        let response = AppError(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn share_query_turns_on_urls_with_minute_expiry() {
        let fs = handler().await;
        let query = ListQuery {
            share: Some("1".to_string()),
            recursive: None,
            expire: None,
        };
        let Json(envelope) = list_at(&fs, "/a", query).await.unwrap();
        assert!(envelope.success);
        assert_eq!(
            envelope.result["/a/b.txt"].url.as_deref(),
            Some("memory://a/b.txt?expires=600")
        );
        assert_eq!(envelope.result["/a"].url.as_deref(), Some("-"));
    }

    #[tokio::test]
    async fn plain_listing_has_no_urls() {
        let fs = handler().await;
        let Json(envelope) = list_at(&fs, "/a", ListQuery::default()).await.unwrap();
        assert!(envelope.result["/a/b.txt"].url.is_none());
    }
}

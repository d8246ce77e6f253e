//! HTTP 接口层（网关角色）

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::build_info;
use crate::model::{UploadAccepted, UploadedEvent};
use crate::queue::publish_event;
use crate::storage::paths;
use crate::util::WebResult;
use crate::AppState;

/// 上传大小上限：5 MiB
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

pub fn routes(app_state: AppState) -> Router {
    Router::new()
        .route("/api/upload", post(upload))
        .route("/api/health", get(health_check))
        // multipart 头部还有开销，body 限额留一点余量，真正的 5MiB 限制在 handler 里
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 64 * 1024))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// 图片上传接口
///
/// 成功路径：写原件 → 发布 UploadedEvent（等待落队确认）→ 202 返回 image_id。
/// 写盘和发布之间没有事务：原件已落盘但发布失败时返回 500，磁盘上会留下
/// 一个没有事件指向的孤儿文件，调用方重新上传即可。
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> impl IntoResponse {
    let (filename, bytes) = loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                // 其它字段忽略，只认 image
                if field.name() != Some("image") {
                    continue;
                }

                let filename = match field
                    .file_name()
                    .map(|name| name.to_string())
                    .filter(|name| !name.is_empty())
                {
                    Some(filename) => filename,
                    None => {
                        return (
                            StatusCode::BAD_REQUEST,
                            WebResult::err_with_code(400, "image 字段缺少文件名").into_json(),
                        );
                    }
                };

                match field.bytes().await {
                    Ok(bytes) => break (filename, bytes),
                    Err(err) => {
                        warn!(
                            event = "upload.rejected",
                            reason = "read_failed",
                            "读取上传内容失败: {}",
                            err
                        );
                        return (
                            StatusCode::BAD_REQUEST,
                            WebResult::err_with_code(400, "读取上传内容失败").into_json(),
                        );
                    }
                }
            }
            Ok(None) => {
                warn!(
                    event = "upload.rejected",
                    reason = "missing_field",
                    "上传请求缺少 image 字段"
                );
                return (
                    StatusCode::BAD_REQUEST,
                    WebResult::err_with_code(400, "缺少 image 文件字段").into_json(),
                );
            }
            Err(err) => {
                warn!(
                    event = "upload.rejected",
                    reason = "bad_multipart",
                    "multipart 解析失败: {}",
                    err
                );
                return (
                    StatusCode::BAD_REQUEST,
                    WebResult::err_with_code(400, "无效的 multipart 请求").into_json(),
                );
            }
        }
    };

    if bytes.len() > MAX_UPLOAD_BYTES {
        warn!(
            event = "upload.rejected",
            reason = "too_large",
            size = bytes.len(),
            "上传内容超过 5MiB 上限"
        );
        return (
            StatusCode::BAD_REQUEST,
            WebResult::err_with_code(400, "文件超过 5MiB 上限").into_json(),
        );
    }

    // image_id 在此一次性生成，之后贯穿所有信封不再变化
    let image_id = Uuid::new_v4().to_string();
    let origin_key = paths::origin_key(&filename);

    if let Err(err) = state.storage.put(&origin_key, &bytes).await {
        error!(
            event = "upload.store_failed",
            origin_path = %origin_key,
            "保存原件失败: {:#}",
            err
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            WebResult::err_custom("保存文件失败").into_json(),
        );
    }

    let uploaded = UploadedEvent {
        image_id: image_id.clone(),
        original_path: origin_key.clone(),
    };
    if let Err(err) = publish_event(state.publisher.as_ref(), &uploaded).await {
        // 孤儿文件窗口：原件已在磁盘上，但没有事件指向它
        error!(
            event = "upload.publish_failed",
            image_id = %image_id,
            origin_path = %origin_key,
            "发布上传事件失败: {:#}",
            err
        );
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            WebResult::err_custom("发布上传事件失败").into_json(),
        );
    }

    info!(
        event = "upload.accepted",
        image_id = %image_id,
        origin_path = %origin_key,
        size = bytes.len(),
        "已接收上传 '{}'",
        filename
    );
    (
        StatusCode::ACCEPTED,
        WebResult::ok(UploadAccepted { image_id }).into_json(),
    )
}

#[derive(Debug, Serialize)]
struct HealthStatus {
    status: String,
    version: String,
    storage_ok: bool,
    timestamp: String,
}

/// 基本健康检查
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_ok = state.storage.health_check().await.unwrap_or(false);
    let status = HealthStatus {
        status: if storage_ok { "healthy" } else { "degraded" }.to_string(),
        version: build_info::summary(),
        storage_ok,
        timestamp: Utc::now().to_rfc3339(),
    };
    Json(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::testing::RecordingPublisher;
    use crate::storage::{LocalStorage, Storage};
    use crate::util::config::Config;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const BOUNDARY: &str = "test-boundary";

    fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\r\n",
                    field, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", field).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn test_state(temp_dir: &TempDir, publisher: Arc<RecordingPublisher>) -> AppState {
        AppState {
            storage: Arc::new(LocalStorage::new(temp_dir.path()).unwrap()),
            publisher,
            config: Config::default(),
        }
    }

    #[tokio::test]
    async fn upload_accepts_and_publishes_single_image_id() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::shared();
        let state = test_state(&temp_dir, Arc::clone(&publisher));
        let storage: Arc<dyn Storage> = Arc::clone(&state.storage);
        let app = routes(state);

        let body = multipart_body("image", Some("cat.png"), b"fake png bytes");
        let response = app.oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let result: WebResult = serde_json::from_slice(&body).unwrap();
        assert!(result.success);
        let image_id = result.data["image_id"].as_str().unwrap().to_string();
        assert!(!image_id.is_empty());

        // 原件按客户端文件名落盘
        assert_eq!(
            storage
                .get("images/origin/cat.png")
                .await
                .unwrap()
                .unwrap(),
            b"fake png bytes"
        );

        // 信封里携带的是同一个 image_id
        let published = publisher.take().await;
        assert_eq!(published.len(), 1);
        let event: UploadedEvent = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(event.image_id, image_id);
        assert_eq!(event.original_path, "images/origin/cat.png");
    }

    #[tokio::test]
    async fn upload_without_file_field_is_rejected_with_no_publish() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::shared();
        let app = routes(test_state(&temp_dir, Arc::clone(&publisher)));

        let body = multipart_body("something_else", None, b"value");
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(publisher.take().await.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_server_error() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::failing();
        let app = routes(test_state(&temp_dir, publisher));

        let body = multipart_body("image", Some("dog.jpg"), b"bytes");
        let response = app.oneshot(upload_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

//! 中转段：把上传原件复制到规范输入位置，然后请求处理

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::model::{ProcessingRequestedEvent, UploadedEvent};
use crate::queue::{publish_event, EventHandler, EventPublisher, HandlerOutcome};
use crate::storage::{paths, Storage};

pub struct StagingRelayHandler {
    storage: Arc<dyn Storage>,
    publisher: Arc<dyn EventPublisher>,
}

impl StagingRelayHandler {
    pub fn new(storage: Arc<dyn Storage>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { storage, publisher }
    }

    /// 复制原件到输入目录并发布处理请求。
    /// 任何一步失败都直接返回错误，让消息留在队列里等待重投；
    /// 复制是覆盖写，重做无害。
    async fn relay(&self, event: &UploadedEvent) -> Result<String> {
        let staged_key = paths::staged_key(&event.image_id, &event.original_path);

        let bytes = self
            .storage
            .get(&event.original_path)
            .await
            .with_context(|| format!("读取原始文件失败: {}", event.original_path))?
            .ok_or_else(|| anyhow!("原始文件不存在: {}", event.original_path))?;

        self.storage
            .put(&staged_key, &bytes)
            .await
            .with_context(|| format!("写入暂存文件失败: {}", staged_key))?;

        publish_event(
            self.publisher.as_ref(),
            &ProcessingRequestedEvent {
                image_id: event.image_id.clone(),
                input_path: staged_key.clone(),
            },
        )
        .await
        .context("发布处理请求事件失败")?;

        info!(
            event = "stage.staged",
            image_id = %event.image_id,
            staged_path = %staged_key,
            "原件已复制到输入目录"
        );
        Ok(staged_key)
    }
}

#[async_trait]
impl EventHandler for StagingRelayHandler {
    async fn handle(&self, payload: &[u8]) -> HandlerOutcome {
        let event: UploadedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                return HandlerOutcome::PoisonMessage(
                    anyhow::Error::new(err).context("上传事件信封解析失败"),
                )
            }
        };

        match self.relay(&event).await {
            Ok(_) => HandlerOutcome::Success,
            Err(err) => HandlerOutcome::RetryableFailure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::testing::RecordingPublisher;
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn handler_with(
        temp_dir: &TempDir,
        publisher: Arc<RecordingPublisher>,
    ) -> (StagingRelayHandler, Arc<dyn Storage>) {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(temp_dir.path()).unwrap());
        (
            StagingRelayHandler::new(Arc::clone(&storage), publisher),
            storage,
        )
    }

    #[tokio::test]
    async fn staged_copy_is_byte_identical() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::shared();
        let (handler, storage) = handler_with(&temp_dir, Arc::clone(&publisher));

        let original = b"\x89PNG fake image bytes";
        storage.put("images/origin/cat.png", original).await.unwrap();

        let payload = serde_json::to_vec(&UploadedEvent {
            image_id: "job-1".into(),
            original_path: "images/origin/cat.png".into(),
        })
        .unwrap();

        assert!(matches!(
            handler.handle(&payload).await,
            HandlerOutcome::Success
        ));

        // 复制必须逐字节一致
        let staged = storage.get("images/in/job-1.png").await.unwrap().unwrap();
        assert_eq!(staged, original);

        // 下游信封携带同一个 image_id 和暂存路径
        let published = publisher.take().await;
        assert_eq!(published.len(), 1);
        let event: ProcessingRequestedEvent = serde_json::from_slice(&published[0]).unwrap();
        assert_eq!(event.image_id, "job-1");
        assert_eq!(event.input_path, "images/in/job-1.png");
    }

    #[tokio::test]
    async fn malformed_envelope_is_poison() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::shared();
        let (handler, _storage) = handler_with(&temp_dir, Arc::clone(&publisher));

        let outcome = handler.handle(b"not json at all").await;
        assert!(matches!(outcome, HandlerOutcome::PoisonMessage(_)));
        assert!(publisher.take().await.is_empty());
    }

    #[tokio::test]
    async fn missing_origin_is_retryable() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::shared();
        let (handler, _storage) = handler_with(&temp_dir, Arc::clone(&publisher));

        let payload = serde_json::to_vec(&UploadedEvent {
            image_id: "job-2".into(),
            original_path: "images/origin/gone.png".into(),
        })
        .unwrap();

        let outcome = handler.handle(&payload).await;
        assert!(matches!(outcome, HandlerOutcome::RetryableFailure(_)));
        assert!(publisher.take().await.is_empty());
    }

    #[tokio::test]
    async fn publish_failure_is_retryable_and_copy_remains() {
        let temp_dir = TempDir::new().unwrap();
        let publisher = RecordingPublisher::failing();
        let (handler, storage) = handler_with(&temp_dir, publisher);

        storage.put("images/origin/dog.jpg", b"bytes").await.unwrap();

        let payload = serde_json::to_vec(&UploadedEvent {
            image_id: "job-3".into(),
            original_path: "images/origin/dog.jpg".into(),
        })
        .unwrap();

        let outcome = handler.handle(&payload).await;
        assert!(matches!(outcome, HandlerOutcome::RetryableFailure(_)));
        // 复制已发生；重投后覆盖写同一目标，最终仍一致
        assert!(storage.exists("images/in/job-3.jpg").await.unwrap());
    }
}

//! 通知段：流水线终点，只消费不发布

use async_trait::async_trait;
use tracing::info;

use crate::model::ReadyEvent;
use crate::queue::{EventHandler, HandlerOutcome};

#[derive(Default)]
pub struct NotificationHandler;

impl NotificationHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventHandler for NotificationHandler {
    async fn handle(&self, payload: &[u8]) -> HandlerOutcome {
        let event: ReadyEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                return HandlerOutcome::PoisonMessage(
                    anyhow::Error::new(err).context("完成事件信封解析失败"),
                )
            }
        };

        // 重投递来的重复 ReadyEvent 不做去重，重复通知只是多一条日志
        info!(
            event = "notify.delivered",
            image_id = %event.image_id,
            grayscale_path = %event.grayscale_path,
            "图片 {} 处理完成，产物位于 {}",
            event.image_id,
            event.grayscale_path
        );
        HandlerOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn valid_event_succeeds() {
        let handler = NotificationHandler::new();
        let payload = serde_json::to_vec(&ReadyEvent {
            image_id: "job-5".into(),
            grayscale_path: "images/out/job-5_grayscale.png".into(),
        })
        .unwrap();

        assert!(matches!(
            handler.handle(&payload).await,
            HandlerOutcome::Success
        ));
    }

    #[tokio::test]
    async fn malformed_event_is_poison() {
        let handler = NotificationHandler::new();
        let outcome = handler.handle(b"[]").await;
        assert!(matches!(outcome, HandlerOutcome::PoisonMessage(_)));
    }
}

//! 流水线段处理器
//!
//! 每段实现 [`crate::queue::EventHandler`]：解析入站信封、执行副作用、
//! 发布下游事件，并用 [`crate::queue::HandlerOutcome`] 告诉消费循环
//! 该 Ack、Nak 还是 Term。段与段之间没有直接调用。

pub mod notify;
pub mod staging;
pub mod transform;

pub use notify::NotificationHandler;
pub use staging::StagingRelayHandler;
pub use transform::TransformHandler;

#[cfg(test)]
pub(crate) mod testing {
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    use crate::queue::EventPublisher;

    /// 记录所有发布内容的桩发布端
    #[derive(Default)]
    pub struct RecordingPublisher {
        pub published: Mutex<Vec<Vec<u8>>>,
        pub fail: bool,
    }

    impl RecordingPublisher {
        pub fn shared() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn failing() -> Arc<Self> {
            Arc::new(Self {
                published: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        pub async fn take(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.published.lock().await)
        }
    }

    #[async_trait]
    impl EventPublisher for RecordingPublisher {
        async fn publish(&self, payload: Vec<u8>) -> Result<()> {
            if self.fail {
                anyhow::bail!("publish failed (stub)");
            }
            self.published.lock().await.push(payload);
            Ok(())
        }
    }
}

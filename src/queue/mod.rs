//! 队列运行时
//!
//! 流水线各段之间只通过 NATS JetStream 的三条工作队列交换 JSON 信封，
//! 段与段之间没有任何直接调用。每条队列对应一个 WorkQueue 保留策略的
//! Stream 和一个显式 ACK 的耐久拉取消费者。
//!
//! ACK 纪律（全流水线统一，至少一次投递）：
//! - handler 返回 [`HandlerOutcome::Success`] 后才 Ack，副作用完成之前
//!   消息始终可重投；
//! - [`HandlerOutcome::RetryableFailure`] 发送 Nak，等待 broker 重投，
//!   重试次数由消费者的 max_deliver 封顶；
//! - [`HandlerOutcome::PoisonMessage`] 发送 Term，坏消息不再投递。
//!
//! handler 自身不接触 broker 的 ACK 接口，投递决策全部在消费循环里。

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use async_nats::jetstream::{self, consumer, stream, AckKind};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::util::config::BrokerConfig;

pub mod pool;

pub use pool::WorkerPool;

/// 上传事件队列
pub const UPLOAD_QUEUE: &str = "image_upload_queue";
/// 处理请求队列
pub const PROCESSING_QUEUE: &str = "image_processing_queue";
/// 处理完成队列
pub const READY_QUEUE: &str = "image_ready_queue";

/// 单条消息的处理结果，由消费循环映射为 Ack/Nak/Term
#[derive(Debug)]
pub enum HandlerOutcome {
    /// 副作用与下游发布全部完成，可以 Ack
    Success,
    /// 失败但重试可能成功（I/O、发布失败），Nak 等待重投
    RetryableFailure(anyhow::Error),
    /// 重试也无法成功的坏消息（信封损坏、图片无法解码），Term 终止投递
    PoisonMessage(anyhow::Error),
}

/// 段处理器：一条入站消息映射为零或一次出站发布加一个副作用
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> HandlerOutcome;
}

/// 发布端：并发安全，网关的多个在途请求共用同一个实例
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布一条信封并等待 broker 确认落队
    async fn publish(&self, payload: Vec<u8>) -> Result<()>;
}

/// 序列化信封并发布
pub async fn publish_event<T: Serialize>(
    publisher: &dyn EventPublisher,
    event: &T,
) -> Result<()> {
    let payload = serde_json::to_vec(event).context("序列化事件信封失败")?;
    publisher.publish(payload).await
}

/// Broker 连接句柄，按队列名派生发布端和消费端
pub struct Broker {
    context: jetstream::Context,
    config: BrokerConfig,
}

impl Broker {
    /// 连接 NATS 服务器，带超时和重试机制
    pub async fn connect(config: &BrokerConfig) -> Result<Self> {
        info!("[plug] 正在连接NATS服务器: {}", config.server_url);

        const MAX_RETRIES: u32 = 3;
        const CONNECT_TIMEOUT_SECS: u64 = 10;
        let mut retry_delay = Duration::from_secs(1);

        for attempt in 1..=MAX_RETRIES {
            let connect_result = tokio::time::timeout(
                Duration::from_secs(CONNECT_TIMEOUT_SECS),
                async_nats::connect(&config.server_url),
            )
            .await;

            match connect_result {
                Ok(Ok(client)) => {
                    info!("[ok] NATS连接成功 (尝试 {}/{})", attempt, MAX_RETRIES);
                    return Ok(Self {
                        context: jetstream::new(client),
                        config: config.clone(),
                    });
                }
                Ok(Err(e)) => {
                    warn!("[fail] NATS连接失败 (尝试 {}/{}): {}", attempt, MAX_RETRIES, e);
                }
                Err(_timeout) => {
                    warn!(
                        "[stopwatch] NATS连接超时 (尝试 {}/{}, {}秒)",
                        attempt, MAX_RETRIES, CONNECT_TIMEOUT_SECS
                    );
                }
            }

            if attempt < MAX_RETRIES {
                info!("等待 {:?} 后重试...", retry_delay);
                sleep(retry_delay).await;
                retry_delay *= 2;
            }
        }

        Err(anyhow!(
            "NATS连接失败，已重试{}次。请检查: 1) NATS服务是否运行 2) 网络连接 3) 配置地址: {}",
            MAX_RETRIES,
            config.server_url
        ))
    }

    /// 声明队列对应的 Stream（WorkQueue 保留策略，幂等）
    pub async fn ensure_queue(&self, queue_name: &str) -> Result<()> {
        self.context
            .get_or_create_stream(build_stream_config(queue_name))
            .await
            .map_err(|e| anyhow!("创建/获取 JetStream Stream [{}] 失败: {}", queue_name, e))?;
        info!("[ok] 队列 [{}] 就绪", queue_name);
        Ok(())
    }

    /// 指定队列的发布端
    pub fn publisher(&self, queue_name: &'static str) -> Arc<dyn EventPublisher> {
        Arc::new(JetStreamPublisher {
            context: self.context.clone(),
            queue_name,
        })
    }

    /// 指定队列的消费端
    pub fn consumer(&self, queue_name: &'static str) -> QueueConsumer {
        QueueConsumer {
            context: self.context.clone(),
            queue_name,
            config: self.config.clone(),
        }
    }
}

/// JetStream 发布端实现
///
/// jetstream::Context 内部就是为并发发布设计的共享句柄，
/// clone 即共享，无需额外加锁。
struct JetStreamPublisher {
    context: jetstream::Context,
    queue_name: &'static str,
}

#[async_trait]
impl EventPublisher for JetStreamPublisher {
    async fn publish(&self, payload: Vec<u8>) -> Result<()> {
        let ack = self
            .context
            .publish(self.queue_name.to_string(), payload.into())
            .await
            .with_context(|| format!("发布消息到 [{}] 失败", self.queue_name))?;

        ack.await
            .with_context(|| format!("等待 [{}] 的 JetStream 确认失败", self.queue_name))?;
        debug!(queue = self.queue_name, "消息已落队");
        Ok(())
    }
}

/// 队列消费端：拉取循环加 ACK 决策
pub struct QueueConsumer {
    context: jetstream::Context,
    queue_name: &'static str,
    config: BrokerConfig,
}

impl QueueConsumer {
    /// 串行消费：一次处理一条，中转段和通知段使用
    pub async fn run(self, handler: Arc<dyn EventHandler>) -> Result<()> {
        info!(
            queue = self.queue_name,
            ack_wait_ms = self.config.ack_wait_ms,
            max_deliver = self.config.max_deliver,
            "启动队列消费者"
        );

        loop {
            let mut messages = self.attach().await?;

            while let Some(item) = messages.next().await {
                match item {
                    Ok(message) => {
                        dispatch(self.queue_name, handler.as_ref(), message).await;
                    }
                    Err(err) => {
                        warn!(queue = self.queue_name, "从 NATS 拉取消息失败: {:#}", err);
                        break;
                    }
                }
            }

            warn!(
                queue = self.queue_name,
                wait_ms = self.config.pull_wait_ms.max(500),
                "NATS 消息流结束，等待后重建"
            );
            sleep(Duration::from_millis(self.config.pull_wait_ms.max(500))).await;
        }
    }

    /// 池化消费：单个拉取循环喂给固定容量的 worker 池，变换段使用。
    ///
    /// 本地通道容量等于 worker 数，池满时 dispatch 挂起，拉取循环随之
    /// 停摆，未 ACK 的消息堆在 broker 侧 —— 这是全流水线唯一的背压机制，
    /// 拥塞传导靠挂起，不靠丢弃，也不在内存里无界缓冲。
    pub async fn run_pooled(self, workers: usize, handler: Arc<dyn EventHandler>) -> Result<()> {
        info!(
            queue = self.queue_name,
            workers,
            ack_wait_ms = self.config.ack_wait_ms,
            max_deliver = self.config.max_deliver,
            "启动池化队列消费者"
        );

        let queue_name = self.queue_name;
        let pool = WorkerPool::spawn(workers, move |message: jetstream::Message| {
            let handler = Arc::clone(&handler);
            async move {
                dispatch(queue_name, handler.as_ref(), message).await;
            }
        });

        loop {
            let mut messages = self.attach().await?;

            while let Some(item) = messages.next().await {
                match item {
                    Ok(message) => {
                        pool.dispatch(message).await?;
                    }
                    Err(err) => {
                        warn!(queue = self.queue_name, "从 NATS 拉取消息失败: {:#}", err);
                        break;
                    }
                }
            }

            warn!(
                queue = self.queue_name,
                wait_ms = self.config.pull_wait_ms.max(500),
                "NATS 消息流结束，等待后重建"
            );
            sleep(Duration::from_millis(self.config.pull_wait_ms.max(500))).await;
        }
    }

    /// 建立 Stream/Consumer 并返回消息流
    async fn attach(&self) -> Result<consumer::pull::Stream> {
        let stream = self
            .context
            .get_or_create_stream(build_stream_config(self.queue_name))
            .await
            .map_err(|e| {
                anyhow!("创建/获取 JetStream Stream [{}] 失败: {}", self.queue_name, e)
            })?;

        let durable = durable_name(self.queue_name);
        let consumer = stream
            .get_or_create_consumer(&durable, build_consumer_config(self.queue_name, &self.config))
            .await
            .map_err(|e| anyhow!("创建/获取消费者 [{}] 失败: {}", durable, e))?;

        let messages = consumer
            .stream()
            .max_messages_per_batch(self.config.max_batch)
            .expires(Duration::from_millis(self.config.pull_wait_ms))
            .messages()
            .await
            .context("获取 JetStream 消息流失败")?;

        Ok(messages)
    }
}

/// 处理一条消息并按结果回 Ack/Nak/Term
async fn dispatch(queue_name: &str, handler: &dyn EventHandler, message: jetstream::Message) {
    let delivered = message
        .info()
        .map(|info| info.delivered)
        .unwrap_or(0);

    match handler.handle(&message.payload).await {
        HandlerOutcome::Success => {
            if let Err(err) = message.ack().await {
                // ACK 丢失意味着 broker 会重投，副作用路径是覆盖写，重做无害
                warn!(
                    queue = queue_name,
                    error = %err,
                    "处理成功但 ACK 失败，消息将被重投"
                );
            } else {
                debug!(queue = queue_name, "消息 ACK 成功");
            }
        }
        HandlerOutcome::RetryableFailure(err) => {
            error!(
                queue = queue_name,
                delivered_attempts = delivered,
                "消息处理失败，将重试: {:#}",
                err
            );
            if let Err(nak_err) = message.ack_with(AckKind::Nak(None)).await {
                warn!(queue = queue_name, "发送 NAK 失败: {:#}", nak_err);
            }
        }
        HandlerOutcome::PoisonMessage(err) => {
            error!(queue = queue_name, "无法处理的消息，终止投递: {:#}", err);
            if let Err(term_err) = message.ack_with(AckKind::Term).await {
                warn!(queue = queue_name, "终止消息失败: {:#}", term_err);
            }
        }
    }
}

fn durable_name(queue_name: &str) -> String {
    format!("{}_consumer", queue_name)
}

fn build_stream_config(queue_name: &str) -> stream::Config {
    let mut stream_config = stream::Config::default();
    stream_config.name = queue_name.to_string();
    stream_config.subjects = vec![queue_name.to_string()];
    stream_config.retention = stream::RetentionPolicy::WorkQueue;
    stream_config
}

fn build_consumer_config(queue_name: &str, config: &BrokerConfig) -> consumer::pull::Config {
    consumer::pull::Config {
        durable_name: Some(durable_name(queue_name)),
        ack_policy: consumer::AckPolicy::Explicit,
        ack_wait: Duration::from_millis(config.ack_wait_ms),
        max_deliver: config.max_deliver as i64,
        filter_subject: queue_name.to_string(),
        max_batch: config.max_batch as i64,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_names_match_wire_topology() {
        assert_eq!(UPLOAD_QUEUE, "image_upload_queue");
        assert_eq!(PROCESSING_QUEUE, "image_processing_queue");
        assert_eq!(READY_QUEUE, "image_ready_queue");
    }

    #[test]
    fn consumer_config_uses_explicit_ack() {
        let broker_config = BrokerConfig::default();
        let config = build_consumer_config(PROCESSING_QUEUE, &broker_config);
        assert!(matches!(config.ack_policy, consumer::AckPolicy::Explicit));
        assert_eq!(
            config.durable_name.as_deref(),
            Some("image_processing_queue_consumer")
        );
        assert_eq!(config.filter_subject, PROCESSING_QUEUE);
    }

    #[test]
    fn stream_config_is_work_queue() {
        let config = build_stream_config(UPLOAD_QUEUE);
        assert_eq!(config.name, UPLOAD_QUEUE);
        assert!(matches!(
            config.retention,
            stream::RetentionPolicy::WorkQueue
        ));
    }
}

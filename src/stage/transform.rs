//! 灰度变换段
//!
//! 解码图片、逐像素转灰度、编码 PNG 落盘、发布完成事件。
//! 像素映射是纯函数，worker 之间没有共享的图像缓冲。

use std::io::Cursor;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use tracing::info;

use crate::model::{ProcessingRequestedEvent, ReadyEvent};
use crate::queue::{publish_event, EventHandler, EventPublisher, HandlerOutcome};
use crate::storage::{paths, Storage};

/// Rec.601 整数亮度近似，与常见灰度模型一致
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

/// 逐像素灰度映射，输出与输入同尺寸
fn to_grayscale(source: &DynamicImage) -> GrayImage {
    let rgba = source.to_rgba8();
    GrayImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let pixel = rgba.get_pixel(x, y);
        Luma([luma(pixel[0], pixel[1], pixel[2])])
    })
}

pub struct TransformHandler {
    storage: Arc<dyn Storage>,
    publisher: Arc<dyn EventPublisher>,
}

/// 变换过程中需要区分投递决策的错误分类
enum TransformError {
    /// 重试可能恢复：文件缺失、写盘失败、发布失败
    Retryable(anyhow::Error),
    /// 重试无意义：图片字节本身无法解码
    Undecodable(anyhow::Error),
}

impl TransformHandler {
    pub fn new(storage: Arc<dyn Storage>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self { storage, publisher }
    }

    async fn transform(&self, event: &ProcessingRequestedEvent) -> Result<String, TransformError> {
        let bytes = self
            .storage
            .get(&event.input_path)
            .await
            .with_context(|| format!("读取输入文件失败: {}", event.input_path))
            .map_err(TransformError::Retryable)?
            .ok_or_else(|| {
                TransformError::Retryable(anyhow!("输入文件不存在: {}", event.input_path))
            })?;

        // 字节已经拿到还解不开，说明内容本身损坏，重投只会重复失败
        let decoded = image::load_from_memory(&bytes)
            .with_context(|| format!("解码图片失败: {}", event.input_path))
            .map_err(TransformError::Undecodable)?;

        let grayscale = to_grayscale(&decoded);

        let mut encoded = Cursor::new(Vec::new());
        grayscale
            .write_to(&mut encoded, ImageFormat::Png)
            .context("编码灰度PNG失败")
            .map_err(TransformError::Retryable)?;

        let output_key = paths::output_key(&event.image_id);
        self.storage
            .put(&output_key, encoded.get_ref())
            .await
            .with_context(|| format!("写入灰度产物失败: {}", output_key))
            .map_err(TransformError::Retryable)?;

        publish_event(
            self.publisher.as_ref(),
            &ReadyEvent {
                image_id: event.image_id.clone(),
                grayscale_path: output_key.clone(),
            },
        )
        .await
        .context("发布完成事件失败")
        .map_err(TransformError::Retryable)?;

        info!(
            event = "stage.transformed",
            image_id = %event.image_id,
            grayscale_path = %output_key,
            width = grayscale.width(),
            height = grayscale.height(),
            "灰度产物已生成"
        );
        Ok(output_key)
    }
}

#[async_trait]
impl EventHandler for TransformHandler {
    async fn handle(&self, payload: &[u8]) -> HandlerOutcome {
        let event: ProcessingRequestedEvent = match serde_json::from_slice(payload) {
            Ok(event) => event,
            Err(err) => {
                return HandlerOutcome::PoisonMessage(
                    anyhow::Error::new(err).context("处理请求信封解析失败"),
                )
            }
        };

        match self.transform(&event).await {
            Ok(_) => HandlerOutcome::Success,
            Err(TransformError::Retryable(err)) => HandlerOutcome::RetryableFailure(err),
            Err(TransformError::Undecodable(err)) => HandlerOutcome::PoisonMessage(err),
        }
    }
}

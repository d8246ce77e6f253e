use serde::{Deserialize, Serialize};

// 队列信封：全部是扁平的字符串字段 JSON，没有版本号字段。
// 字段名即线上契约，不能改名。

/// 上传完成事件，网关发布到 image_upload_queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedEvent {
    pub image_id: String,
    pub original_path: String,
}

/// 处理请求事件，中转段发布到 image_processing_queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRequestedEvent {
    pub image_id: String,
    pub input_path: String,
}

/// 处理完成事件，变换段发布到 image_ready_queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyEvent {
    pub image_id: String,
    pub grayscale_path: String,
}

/// 上传接口 202 响应体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadAccepted {
    pub image_id: String,
}

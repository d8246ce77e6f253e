use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub mod config;
pub mod log;

/// HTTP 接口统一响应体
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebResult {
    pub success: bool,
    #[serde(rename = "errorCode")]
    pub code: u32,
    #[serde(rename = "errorMsg")]
    pub msg: String,
    pub data: Value,
}

impl WebResult {
    pub fn ok(data: impl Serialize) -> Self {
        Self {
            success: true,
            code: 200,
            msg: "".to_string(),
            data: json!(data),
        }
    }

    pub fn err_custom(msg: impl ToString) -> Self {
        Self {
            success: false,
            code: 500,
            msg: msg.to_string(),
            data: Default::default(),
        }
    }

    pub fn err_with_code(code: u32, msg: impl ToString) -> Self {
        Self {
            success: false,
            code,
            msg: msg.to_string(),
            data: Default::default(),
        }
    }

    pub fn into_json(self) -> Json<WebResult> {
        Json(self)
    }
}

//! 配置结构定义模块

use serde::{Deserialize, Serialize};

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP 网关配置
    #[serde(default)]
    pub server: ServerConfig,
    /// NATS JetStream 配置
    #[serde(default)]
    pub broker: BrokerConfig,
    /// 共享存储配置
    #[serde(default)]
    pub storage: StorageConfig,
    /// 灰度变换段配置
    #[serde(default)]
    pub transform: TransformConfig,
    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// NATS JetStream 队列配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// NATS 服务器地址，例如 nats://127.0.0.1:4222
    #[serde(default = "default_broker_url")]
    pub server_url: String,
    /// Ack 等待时长（毫秒），超时未确认即重投
    #[serde(default = "default_ack_wait_ms")]
    pub ack_wait_ms: u64,
    /// 单条消息最大投递次数，超过后不再重投
    #[serde(default = "default_max_deliver")]
    pub max_deliver: i32,
    /// 每次批量拉取的最大消息数量
    #[serde(default = "default_max_batch")]
    pub max_batch: usize,
    /// 拉取请求的等待时间（毫秒）
    #[serde(default = "default_pull_wait_ms")]
    pub pull_wait_ms: u64,
}

fn default_broker_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_ack_wait_ms() -> u64 {
    30_000
}

fn default_max_deliver() -> i32 {
    5
}

fn default_max_batch() -> usize {
    10
}

fn default_pull_wait_ms() -> u64 {
    5_000
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            server_url: default_broker_url(),
            ack_wait_ms: default_ack_wait_ms(),
            max_deliver: default_max_deliver(),
            max_batch: default_max_batch(),
            pull_wait_ms: default_pull_wait_ms(),
        }
    }
}

/// 共享存储配置，所有段进程必须看到同一个根（挂载卷）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: String,
}

fn default_storage_root() -> String {
    "storage".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

/// 灰度变换段配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// worker 数量，同时也是本地入队通道的容量
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    10
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: FileLogConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: FileLogConfig::default(),
        }
    }
}

/// 文件日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLogConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
}

fn default_log_directory() -> String {
    "runtime/logs".to_string()
}

fn default_log_prefix() -> String {
    "image-pipeline".to_string()
}

impl Default for FileLogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: default_log_directory(),
            prefix: default_log_prefix(),
        }
    }
}

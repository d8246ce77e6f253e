use anyhow::Result;
use async_trait::async_trait;

pub mod local;
pub mod paths;

pub use local::LocalStorage;

/// 存储操作trait
///
/// 流水线各段共享同一存储根，键是相对根目录的路径。
#[async_trait]
pub trait Storage: Send + Sync {
    /// 存储文件
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// 获取文件
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 检查文件是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 健康检查
    async fn health_check(&self) -> Result<bool>;
}

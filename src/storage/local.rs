use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::Storage;

/// 本地文件系统存储实现
///
/// 所有段进程挂载同一存储根（共享卷），键解析为根下的绝对路径。
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        // 确保基础目录存在
        std::fs::create_dir_all(&base_path).context("Failed to create storage root")?;

        Ok(Self { base_path })
    }

    /// 获取文件的完整路径
    fn get_full_path(&self, key: &str) -> PathBuf {
        self.base_path.join(key.trim_start_matches('/'))
    }

    /// 确保文件的父目录存在
    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directory")?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.get_full_path(key);

        self.ensure_parent_dir(&path).await?;

        // 同 key 重复写入直接覆盖，产物路径是 image_id 的纯函数
        fs::write(&path, data)
            .await
            .with_context(|| format!("Failed to write file: {}", path.display()))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.get_full_path(key);

        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context("Failed to read file")?,
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.get_full_path(key);
        Ok(path.exists())
    }

    async fn health_check(&self) -> Result<bool> {
        self.base_path
            .try_exists()
            .context("Failed to check storage root")
    }
}

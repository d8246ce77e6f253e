//! 配置加载和管理模块
//! 处理配置文件的读取、写入和环境变量覆盖

use super::types::*;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<Path>) -> Result<Config> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("读取配置文件失败: {}", path.as_ref().display()))?;
        let config = serde_yaml::from_str(&config_str).context("解析配置文件失败")?;
        Ok(config)
    }

    /// 从环境变量读取配置覆盖
    pub fn apply_env_overrides(mut config: Config) -> Config {
        if let Ok(port_str) = std::env::var("PIPELINE_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                config.server.port = port;
                tracing::info!("[ok] 环境变量覆盖服务端口: {}", port);
            }
        }

        if let Ok(url) = std::env::var("PIPELINE_NATS_URL") {
            tracing::info!("[ok] 环境变量覆盖NATS地址: {}", url);
            config.broker.server_url = url;
        }

        if let Ok(root) = std::env::var("PIPELINE_STORAGE_ROOT") {
            tracing::info!("[ok] 环境变量覆盖存储根目录: {}", root);
            config.storage.root = root;
        }

        if let Ok(workers_str) = std::env::var("PIPELINE_WORKERS") {
            if let Ok(workers) = workers_str.parse::<usize>() {
                config.transform.workers = workers.max(1);
                tracing::info!("[ok] 环境变量覆盖worker数量: {}", workers);
            }
        }

        config
    }

    /// 加载配置并应用环境变量覆盖
    pub fn load_with_env_overrides(path: impl AsRef<Path>) -> Result<Config> {
        let config = Self::read_yaml(path)?;
        Ok(Self::apply_env_overrides(config))
    }
}

/// 配置写出器，用于生成模板
pub struct ConfigWriter;

impl ConfigWriter {
    /// 把配置写成YAML，父目录不存在时先创建
    pub fn write_yaml_with_dir(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("创建配置目录失败")?;
            }
        }
        let yaml = serde_yaml::to_string(config).context("序列化配置失败")?;
        fs::write(path, yaml)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }
}

/// 查找配置文件路径：PIPELINE_CONFIG 优先，否则当前目录的 config.yaml
pub fn find_config_file_path() -> PathBuf {
    std::env::var("PIPELINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yaml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn template_roundtrips_through_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("conf/config.yaml");

        ConfigWriter::write_yaml_with_dir(&Config::default(), &path).unwrap();
        let loaded = ConfigLoader::read_yaml(&path).unwrap();

        assert_eq!(loaded.server.port, 8080);
        assert_eq!(loaded.transform.workers, 10);
        assert_eq!(loaded.broker.server_url, "nats://127.0.0.1:4222");
    }

    #[test]
    fn missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("absent.yaml");
        assert!(ConfigLoader::read_yaml(&path).is_err());
    }
}

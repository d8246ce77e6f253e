//! 各角色的引导入口
//!
//! 四个角色共用一套引导流程（配置 → 日志 → broker），之后各走各的：
//! - gateway: HTTP 服务 + 发布 image_upload_queue
//! - staging: 消费 image_upload_queue，发布 image_processing_queue
//! - transform: 池化消费 image_processing_queue，发布 image_ready_queue
//! - notify: 消费 image_ready_queue，终点
//!
//! 角色之间不共享任何进程内状态，每个角色都可以独立重启，
//! 重启后只靠自己的队列重新发现工作。

pub mod http;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

use crate::build_info;
use crate::queue::{self, Broker};
use crate::stage::{NotificationHandler, StagingRelayHandler, TransformHandler};
use crate::storage::{LocalStorage, Storage};
use crate::util::config::{find_config_file_path, Config, ConfigLoader};
use crate::util::log::log_init_with_config;
use crate::AppState;

/// 统一引导：加载配置、初始化日志
pub struct Bootstrap {
    config: Config,
    _log_guard: Option<WorkerGuard>,
}

impl Bootstrap {
    pub fn new() -> Result<Self> {
        let config = load_or_init_config()?;
        let log_guard = log_init_with_config(&config.logging)?;
        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// 加载配置；文件缺失时写出模板并按默认值继续
fn load_or_init_config() -> Result<Config> {
    let path = find_config_file_path();
    if !path.exists() {
        let template = Config::default();
        if let Err(err) = template.write_yaml_to_path(&path) {
            eprintln!("[warn] 无法生成配置模板 {}: {}", path.display(), err);
        } else {
            eprintln!("[init] 配置文件不存在，已生成模板: {}", path.display());
        }
        return Ok(ConfigLoader::apply_env_overrides(template));
    }
    ConfigLoader::load_with_env_overrides(&path)
}

fn open_storage(config: &Config) -> Result<Arc<dyn Storage>> {
    let storage = LocalStorage::new(&config.storage.root)
        .with_context(|| format!("初始化存储根目录失败: {}", config.storage.root))?;
    Ok(Arc::new(storage))
}

/// 启动网关角色：HTTP 上传入口
pub async fn start_gateway() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let config = bootstrap.config().clone();

    info!("=== 图片流水线网关启动 ===");
    info!("版本信息: {}", build_info::summary());
    info!("服务端口: {}", config.server.port);

    let storage = open_storage(&config)?;
    let broker = Broker::connect(&config.broker).await?;
    broker.ensure_queue(queue::UPLOAD_QUEUE).await?;

    let app_state = AppState {
        storage,
        publisher: broker.publisher(queue::UPLOAD_QUEUE),
        config: config.clone(),
    };

    let server = http::ServerManager::create_server(&config, app_state).await?;
    http::ServerManager::start_server(server).await
}

/// 启动中转角色：原件复制到规范输入位置
pub async fn start_staging() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let config = bootstrap.config().clone();

    info!("=== 图片流水线中转段启动 ===");
    info!("版本信息: {}", build_info::summary());

    let storage = open_storage(&config)?;
    let broker = Broker::connect(&config.broker).await?;
    broker.ensure_queue(queue::UPLOAD_QUEUE).await?;
    broker.ensure_queue(queue::PROCESSING_QUEUE).await?;

    let handler = Arc::new(StagingRelayHandler::new(
        storage,
        broker.publisher(queue::PROCESSING_QUEUE),
    ));
    run_until_shutdown(broker.consumer(queue::UPLOAD_QUEUE).run(handler)).await
}

/// 启动变换角色：灰度 worker 池
pub async fn start_transform() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let config = bootstrap.config().clone();

    info!("=== 图片流水线变换段启动 ===");
    info!("版本信息: {}", build_info::summary());
    info!("worker 数量: {}", config.transform.workers);

    let storage = open_storage(&config)?;
    let broker = Broker::connect(&config.broker).await?;
    broker.ensure_queue(queue::PROCESSING_QUEUE).await?;
    broker.ensure_queue(queue::READY_QUEUE).await?;

    let handler = Arc::new(TransformHandler::new(
        storage,
        broker.publisher(queue::READY_QUEUE),
    ));
    run_until_shutdown(
        broker
            .consumer(queue::PROCESSING_QUEUE)
            .run_pooled(config.transform.workers, handler),
    )
    .await
}

/// 启动通知角色：终端消费者
pub async fn start_notify() -> Result<()> {
    let bootstrap = Bootstrap::new()?;
    let config = bootstrap.config().clone();

    info!("=== 图片流水线通知段启动 ===");
    info!("版本信息: {}", build_info::summary());

    let broker = Broker::connect(&config.broker).await?;
    broker.ensure_queue(queue::READY_QUEUE).await?;

    let handler = Arc::new(NotificationHandler::new());
    run_until_shutdown(broker.consumer(queue::READY_QUEUE).run(handler)).await
}

/// 消费循环跑到退出信号为止；在途消息不中断，未 ACK 的会被重投
async fn run_until_shutdown(task: impl Future<Output = Result<()>>) -> Result<()> {
    tokio::select! {
        result = task => result,
        _ = http::shutdown_signal() => {
            info!("[stop] 停止消费，进程退出");
            Ok(())
        }
    }
}

/// 系统健康检查报告
#[derive(Debug, Clone)]
pub struct SystemHealthReport {
    pub overall_healthy: bool,
    pub storage_healthy: bool,
    pub broker_healthy: bool,
}

/// 健康检查：存储根可达 + broker 可连
pub async fn check_system_health() -> Result<SystemHealthReport> {
    let bootstrap = Bootstrap::new()?;
    let config = bootstrap.config();

    let storage_healthy = match open_storage(config) {
        Ok(storage) => storage.health_check().await.unwrap_or(false),
        Err(err) => {
            warn!("存储健康检查失败: {:#}", err);
            false
        }
    };

    let broker_healthy = match Broker::connect(&config.broker).await {
        Ok(_) => true,
        Err(err) => {
            warn!("broker健康检查失败: {:#}", err);
            false
        }
    };

    Ok(SystemHealthReport {
        overall_healthy: storage_healthy && broker_healthy,
        storage_healthy,
        broker_healthy,
    })
}

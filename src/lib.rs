use std::sync::Arc;

pub mod api;
pub mod build_info;
pub mod model;
pub mod queue;
pub mod server;
pub mod stage;
pub mod storage;
pub mod util;

use queue::EventPublisher;
use storage::Storage;
use util::config::Config;

/// 网关角色的应用状态
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// 共享发布端；并发请求同时发布由 JetStream context 自身保证安全
    pub publisher: Arc<dyn EventPublisher>,
    pub config: Config,
}

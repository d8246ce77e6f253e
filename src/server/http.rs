//! HTTP服务器设置模块
//! 负责创建和启动网关的HTTP服务器

use crate::api::routes;
use crate::util::config::Config;
use crate::AppState;
use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// HTTP服务器管理器
pub struct ServerManager;

pub struct HttpServer {
    listener: TcpListener,
    app_routes: Router,
    local_addr: SocketAddr,
}

impl ServerManager {
    /// 创建HTTP服务器
    pub async fn create_server(config: &Config, app_state: AppState) -> Result<HttpServer> {
        info!(
            target: "server.http",
            event = "http.server.create",
            "创建HTTP服务器"
        );

        let listener = Self::bind_listener(&config.server.host, config.server.port).await?;
        let local_addr = listener.local_addr()?;

        let app_routes = routes(app_state);

        info!(
            target: "server.http",
            event = "http.server.ready",
            address = %local_addr
        );

        Ok(HttpServer {
            listener,
            app_routes,
            local_addr,
        })
    }

    /// 绑定监听端口
    async fn bind_listener(host: &str, port: u16) -> Result<TcpListener> {
        let addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| anyhow::anyhow!("端口绑定失败 ({}): {}", addr, e))?;
        info!(
            target: "server.http",
            event = "http.server.bound",
            address = %addr
        );
        Ok(listener)
    }

    /// 启动服务器，阻塞直到收到退出信号
    pub async fn start_server(server: HttpServer) -> Result<()> {
        info!(
            target: "server.http",
            event = "http.server.start",
            address = %server.local_addr
        );

        axum::serve(server.listener, server.app_routes)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP服务器已关闭");
        Ok(())
    }
}

/// 优雅关闭信号：SIGINT 或 SIGTERM
///
/// 退出只是停止接收新请求/新消息，在途工作不会被中断。
pub async fn shutdown_signal() {
    tokio::select! {
        _ = ctrl_c() => {
            info!(
                target: "server.http",
                event = "shutdown.signal",
                signal = "SIGINT"
            );
        }
        _ = wait_for_sigterm() => {
            info!(
                target: "server.http",
                event = "shutdown.signal",
                signal = "SIGTERM"
            );
        }
    }
    warn!(target: "server.http", event = "shutdown.begin", "准备退出");
}

/// 等待 SIGTERM 信号
async fn wait_for_sigterm() {
    #[cfg(unix)]
    {
        match signal(SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(err) => {
                warn!("注册SIGTERM监听失败: {}", err);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // 非Unix系统，永远等待
        std::future::pending::<()>().await;
    }
}

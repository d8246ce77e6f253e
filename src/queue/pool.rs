//! 固定容量 worker 池
//!
//! 入队通道容量与 worker 数一致。通道满时 [`WorkerPool::dispatch`] 挂起，
//! 调用方（broker 拉取循环）随之停止拉取，拥塞就这样一路传导回 broker。

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// 纯生产者/消费者池，worker 之间除入队通道外不共享任何状态
pub struct WorkerPool<T: Send + 'static> {
    sender: mpsc::Sender<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// 启动 workers 个 worker，每个按序从共享通道取件处理
    pub fn spawn<F, Fut>(workers: usize, worker_fn: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<T>(workers);
        let receiver = Arc::new(Mutex::new(receiver));

        for id in 1..=workers {
            let receiver = Arc::clone(&receiver);
            let worker_fn = worker_fn.clone();
            tokio::spawn(async move {
                debug!(worker = id, "worker 启动");
                loop {
                    // 锁只覆盖取件，处理期间不持有
                    let item = { receiver.lock().await.recv().await };
                    match item {
                        Some(item) => worker_fn(item).await,
                        None => break,
                    }
                }
                debug!(worker = id, "worker 退出");
            });
        }

        Self { sender }
    }

    /// 投递一件任务；池满时挂起直到有空位，不丢弃
    pub async fn dispatch(&self, item: T) -> Result<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| anyhow!("worker 池已关闭，任务无法投递"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;
    use tokio::time::timeout;

    #[tokio::test]
    async fn dispatch_blocks_when_pool_saturated() {
        let gate = Arc::new(Semaphore::new(0));
        let pool = WorkerPool::spawn(2, {
            let gate = Arc::clone(&gate);
            move |_item: u32| {
                let gate = Arc::clone(&gate);
                async move {
                    let _permit = gate.acquire().await.unwrap();
                }
            }
        });

        // 2 个 worker 各持有一件，通道再缓冲 2 件，共 4 件在途
        for i in 0..4u32 {
            timeout(Duration::from_millis(500), pool.dispatch(i))
                .await
                .expect("pool should accept up to workers + capacity items")
                .unwrap();
        }

        // 第 5 件必须挂起而不是被缓冲或丢弃
        let stalled = timeout(Duration::from_millis(200), pool.dispatch(99)).await;
        assert!(stalled.is_err(), "dispatch should stall when pool is full");

        gate.add_permits(16);
    }

    #[tokio::test]
    async fn all_dispatched_items_are_processed() {
        let processed = Arc::new(AtomicU32::new(0));
        let pool = WorkerPool::spawn(4, {
            let processed = Arc::clone(&processed);
            move |_item: u32| {
                let processed = Arc::clone(&processed);
                async move {
                    processed.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        for i in 0..32u32 {
            pool.dispatch(i).await.unwrap();
        }

        timeout(Duration::from_secs(2), async {
            while processed.load(Ordering::SeqCst) < 32 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("all items should be processed");
    }
}

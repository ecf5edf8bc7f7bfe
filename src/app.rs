use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{routing::any, Router};
use formfill_config::AppConfig;
use formfill_dispatcher::{AdmissionController, CampaignScheduler, ExecutionDispatcher};
use formfill_domain::{FillRequest, FillRequestRepository, ProgressNotifier};
use formfill_infrastructure::{InMemoryFormCache, MemoryFillRequestRepository, SimulatedFormEngine};
use formfill_realtime::{
    websocket_handler, CampaignSnapshot, GatewayConfig, RealtimeGateway, RealtimeState,
    SnapshotProvider,
};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 主应用程序
///
/// 把内存存储、准入控制、派发器、调度器与实时网关装配到一起，
/// 并驱动全部后台周期循环
pub struct Application {
    config: AppConfig,
    repo: Arc<MemoryFillRequestRepository>,
    scheduler: Arc<CampaignScheduler>,
    gateway: Arc<RealtimeGateway>,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        let repo = Arc::new(MemoryFillRequestRepository::new());
        let admission = Arc::new(AdmissionController::new(config.scheduler.worker_capacity));
        let form_cache = Arc::new(InMemoryFormCache::new());
        let engine = Arc::new(SimulatedFormEngine::new(
            config.engine.success_rate,
            config.engine.submission_latency_ms,
        ));

        let gateway = Arc::new(
            RealtimeGateway::new(GatewayConfig {
                burst_max: config.realtime.burst_max,
                publish_floor_ms: config.realtime.publish_floor_ms,
                dedup_max_entries: config.realtime.dedup_max_entries,
                idle_after_seconds: config.realtime.counter_idle_seconds,
            })
            .with_snapshot_provider(Arc::new(RepositorySnapshots {
                repo: Arc::clone(&repo),
            })),
        );

        let dispatcher = ExecutionDispatcher::new(
            repo.clone() as Arc<dyn FillRequestRepository>,
            engine,
            gateway.clone() as Arc<dyn ProgressNotifier>,
            Arc::clone(&admission),
            config.sampler.jitter_fraction,
        );

        let scheduler = Arc::new(CampaignScheduler::new(
            repo.clone() as Arc<dyn FillRequestRepository>,
            admission,
            dispatcher,
            form_cache,
            config.scheduler.lookahead_seconds,
        ));

        Self {
            config,
            repo,
            scheduler,
            gateway,
        }
    }

    /// 活动创建入口：校验、排到队尾、落库
    pub async fn enqueue_campaign(&self, mut campaign: FillRequest) -> Result<()> {
        campaign.max_retries = self.config.scheduler.max_retries;
        campaign.validate().context("活动参数校验失败")?;
        campaign.queue_position = Some(self.repo.next_queue_position().await?);
        self.repo.create(&campaign).await?;
        info!(
            "活动 {} 已入队，位置 {:?}，目标 {} 次提交",
            campaign.id, campaign.queue_position, campaign.target_count
        );
        Ok(())
    }

    /// 运行全部后台循环直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut handles = Vec::new();

        // 调度循环：提升 + 排空
        {
            let scheduler = Arc::clone(&self.scheduler);
            let interval = self.config.scheduler.poll_interval_seconds;
            let mut shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if let Err(e) = scheduler.promote_due_campaigns().await {
                                error!("调度提升通道出错: {e}");
                            }
                            if let Err(e) = scheduler.drain_queued_backlog().await {
                                error!("调度排空通道出错: {e}");
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }
                info!("调度循环已停止");
            }));
        }

        // 表单缓存清理循环
        {
            let scheduler = Arc::clone(&self.scheduler);
            let interval = self.config.scheduler.cache_sweep_interval_seconds;
            let mut shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                // 跳过启动时的第一次立即触发
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => scheduler.sweep_form_cache().await,
                        _ = shutdown_rx.recv() => break,
                    }
                }
                info!("缓存清理循环已停止");
            }));
        }

        // 实时层清理循环
        {
            let gateway = Arc::clone(&self.gateway);
            let interval = self.config.realtime.sweep_interval_seconds;
            let mut shutdown_rx = shutdown_rx.resubscribe();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(interval));
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => gateway.sweep(),
                        _ = shutdown_rx.recv() => break,
                    }
                }
                info!("实时清理循环已停止");
            }));
        }

        // websocket 服务
        if self.config.realtime.enabled {
            let bind_address = self.config.realtime.bind_address.clone();
            let state = RealtimeState {
                gateway: Arc::clone(&self.gateway),
            };
            let mut shutdown_rx = shutdown_rx.resubscribe();
            let listener = TcpListener::bind(&bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {bind_address}"))?;
            info!("实时推送服务启动在 ws://{bind_address}/ws");

            handles.push(tokio::spawn(async move {
                let router = Router::new()
                    .route("/ws", any(websocket_handler))
                    .with_state(state);
                let server = axum::serve(listener, router.into_make_service())
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.recv().await;
                    });
                if let Err(e) = server.await {
                    error!("实时推送服务运行失败: {e}");
                }
                info!("实时推送服务已停止");
            }));
        }

        let mut shutdown_rx = shutdown_rx.resubscribe();
        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号，等待各循环退出");

        for handle in handles {
            let _ = handle.await;
        }

        Ok(())
    }
}

/// 基于内存存储实现加入房间时的全量状态
struct RepositorySnapshots {
    repo: Arc<MemoryFillRequestRepository>,
}

#[async_trait]
impl SnapshotProvider for RepositorySnapshots {
    async fn room_snapshot(&self, room: &str) -> Vec<CampaignSnapshot> {
        self.repo
            .all()
            .await
            .into_iter()
            .filter(|campaign| {
                let form_room = format!("form.{}", campaign.form_id);
                let user_form_room =
                    format!("user.{}.form.{}", campaign.user_id, campaign.form_id);
                room == form_room || room == user_form_room
            })
            .map(|campaign| CampaignSnapshot {
                campaign_id: campaign.id,
                form_id: campaign.form_id,
                status: campaign.status,
                completed: campaign.completed_count,
                total: campaign.target_count,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formfill_testing_utils::FillRequestBuilder;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_enqueue_assigns_tail_position() {
        let app = Application::new(AppConfig::default());

        let first = FillRequestBuilder::new().with_question(&[100]).build();
        let second = FillRequestBuilder::new().with_question(&[100]).build();
        app.enqueue_campaign(first.clone()).await.unwrap();
        app.enqueue_campaign(second.clone()).await.unwrap();

        let stored = app.repo.get_by_id(second.id).await.unwrap().unwrap();
        assert_eq!(stored.queue_position, Some(2));
        assert_eq!(stored.max_retries, 3);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_campaign() {
        let app = Application::new(AppConfig::default());
        // 百分比之和不是 100
        let campaign = FillRequestBuilder::new().with_question(&[60, 60]).build();
        assert!(app.enqueue_campaign(campaign).await.is_err());
    }

    #[tokio::test]
    async fn test_room_snapshot_scoped_to_form() {
        let app = Application::new(AppConfig::default());
        let campaign = FillRequestBuilder::new().with_question(&[100]).build();
        app.enqueue_campaign(campaign.clone()).await.unwrap();

        let snapshots = RepositorySnapshots {
            repo: Arc::clone(&app.repo),
        };
        let frames = snapshots
            .room_snapshot(&format!("form.{}", campaign.form_id))
            .await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].campaign_id, campaign.id);

        let empty = snapshots
            .room_snapshot(&format!("form.{}", Uuid::new_v4()))
            .await;
        assert!(empty.is_empty());
    }
}

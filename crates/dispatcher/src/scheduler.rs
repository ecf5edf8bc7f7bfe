use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use formfill_domain::{FillRequest, FillRequestRepository, FormCache};
use formfill_errors::FillResult;

use crate::admission::AdmissionController;
use crate::dispatch::ExecutionDispatcher;

/// 活动调度器
///
/// 两条相互独立的周期通道：
/// 1. 提升通道：把开始时间已到（含前瞻量）的 QUEUED 活动交给派发器；
/// 2. 排空通道：重扫全部 QUEUED 积压，只要有容量就继续启动，
///    避免活动被一次容量饱和卡死在原定时间点上。
/// 另有周期性的表单缓存清理，失败只记日志、从不上抛。
pub struct CampaignScheduler {
    pub repo: Arc<dyn FillRequestRepository>,
    pub admission: Arc<AdmissionController>,
    pub dispatcher: ExecutionDispatcher,
    pub form_cache: Arc<dyn FormCache>,
    pub lookahead: Duration,
}

impl CampaignScheduler {
    pub fn new(
        repo: Arc<dyn FillRequestRepository>,
        admission: Arc<AdmissionController>,
        dispatcher: ExecutionDispatcher,
        form_cache: Arc<dyn FormCache>,
        lookahead_seconds: i64,
    ) -> Self {
        Self {
            repo,
            admission,
            dispatcher,
            form_cache,
            lookahead: Duration::seconds(lookahead_seconds),
        }
    }

    /// 提升通道：启动开始时间落在 now + lookahead 之内的 QUEUED 活动
    pub async fn promote_due_campaigns(&self) -> FillResult<usize> {
        let horizon = Utc::now() + self.lookahead;
        let mut due = self.repo.find_due_queued(horizon).await?;
        if due.is_empty() {
            return Ok(0);
        }
        debug!("本轮有 {} 个活动到达调度时间", due.len());
        sort_by_queue_order(&mut due);
        self.start_batch(due).await
    }

    /// 排空通道：按同样的优先级次序重扫全部积压
    pub async fn drain_queued_backlog(&self) -> FillResult<usize> {
        let mut queued = self.repo.find_queued().await?;
        if queued.is_empty() {
            return Ok(0);
        }
        sort_by_queue_order(&mut queued);
        self.start_batch(queued).await
    }

    /// 逐个尝试启动；单个活动的失败不中断其余活动
    async fn start_batch(&self, candidates: Vec<FillRequest>) -> FillResult<usize> {
        let mut started = 0usize;
        for campaign in candidates {
            if !self.admission.has_capacity() {
                debug!(
                    "执行容量已满 ({}/{})，其余活动等待下一轮",
                    self.admission.active(),
                    self.admission.capacity()
                );
                break;
            }
            let campaign_id = campaign.id;
            match self.dispatcher.start_campaign(campaign).await {
                Ok(true) => started += 1,
                Ok(false) => {}
                Err(e) => {
                    error!("启动活动 {} 失败: {}", campaign_id, e);
                }
            }
        }
        if started > 0 {
            info!("本轮调度启动了 {} 个活动", started);
        }
        Ok(started)
    }

    /// 清理外部表单读取子系统的旁路缓存，限制内存增长
    pub async fn sweep_form_cache(&self) {
        match self.form_cache.invalidate_all().await {
            Ok(evicted) => {
                if evicted > 0 {
                    info!("表单缓存清理完成，清除 {} 条", evicted);
                }
            }
            Err(e) => {
                warn!("表单缓存清理失败（已忽略）: {}", e);
            }
        }
    }
}

/// 队列排序键：优先级降序，其次队列位置升序，无位置者排最后
pub fn sort_by_queue_order(campaigns: &mut [FillRequest]) {
    campaigns.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| match (a.queue_position, b.queue_position) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use formfill_domain::CampaignMode;
    use uuid::Uuid;

    fn campaign(priority: i32, position: Option<i32>) -> FillRequest {
        let mut req = FillRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            5,
            CampaignMode::DistributionDriven,
        );
        req.priority = priority;
        req.queue_position = position;
        req
    }

    #[test]
    fn test_sort_priority_desc_then_position_asc() {
        let mut list = vec![
            campaign(1, Some(4)),
            campaign(5, Some(9)),
            campaign(5, Some(2)),
            campaign(3, Some(1)),
        ];
        sort_by_queue_order(&mut list);
        let keys: Vec<(i32, Option<i32>)> =
            list.iter().map(|c| (c.priority, c.queue_position)).collect();
        assert_eq!(
            keys,
            vec![(5, Some(2)), (5, Some(9)), (3, Some(1)), (1, Some(4))]
        );
    }

    #[test]
    fn test_sort_null_position_last() {
        let mut list = vec![campaign(2, None), campaign(2, Some(7)), campaign(2, Some(3))];
        sort_by_queue_order(&mut list);
        let keys: Vec<Option<i32>> = list.iter().map(|c| c.queue_position).collect();
        assert_eq!(keys, vec![Some(3), Some(7), None]);
    }
}

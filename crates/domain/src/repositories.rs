//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::entities::FillRequest;
use crate::state::FillRequestStatus;
use formfill_errors::FillResult;

/// 填充活动仓储抽象
#[async_trait]
pub trait FillRequestRepository: Send + Sync {
    async fn create(&self, request: &FillRequest) -> FillResult<()>;
    async fn get_by_id(&self, id: Uuid) -> FillResult<Option<FillRequest>>;
    async fn update(&self, request: &FillRequest) -> FillResult<()>;
    async fn update_status(&self, id: Uuid, status: FillRequestStatus) -> FillResult<()>;

    /// QUEUED 且生效开始时间不晚于 `before` 的活动
    async fn find_due_queued(&self, before: DateTime<Utc>) -> FillResult<Vec<FillRequest>>;

    /// 全部 QUEUED 活动（调用方自行排序）
    async fn find_queued(&self) -> FillResult<Vec<FillRequest>>;

    /// 下一个可用的队列位置（当前最大值 + 1）
    async fn next_queue_position(&self) -> FillResult<i32>;

    /// 某个活动离开队列后，原子地前移其后全部位置，保持位置紧凑
    async fn compact_positions_above(&self, position: i32) -> FillResult<()>;

    /// 原子累加完成计数，返回累加后的完成总数
    async fn increment_completed(&self, id: Uuid, n: u32) -> FillResult<u32>;
}

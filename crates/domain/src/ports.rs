//! 对外协作方端口
//!
//! 表单引擎、表单定义缓存与实时推送均为外部协作方，
//! 调度核心只依赖这里的抽象

use async_trait::async_trait;

use crate::entities::{SubmissionOutcome, SubmissionPlan};
use crate::events::{BalanceEvent, ProgressEvent};
use formfill_errors::FillResult;

/// 浏览器自动化表单引擎契约
///
/// 每个被放行的活动每轮最多调用一次；调用是异步的，
/// 结果通过返回值在完成回调中观察
#[async_trait]
pub trait FormFillEngine: Send + Sync {
    async fn submit(&self, plan: SubmissionPlan) -> FillResult<SubmissionOutcome>;
}

/// 表单读取子系统持有的旁路缓存
#[async_trait]
pub trait FormCache: Send + Sync {
    /// 全量失效，返回清理的条目数
    async fn invalidate_all(&self) -> FillResult<usize>;
}

/// 进度推送端口，实现方保证尽力送达且不阻塞调度
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn campaign_progress(&self, event: ProgressEvent);
    async fn balance_changed(&self, event: BalanceEvent);
}

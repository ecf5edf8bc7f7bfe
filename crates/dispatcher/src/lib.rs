//! 活动调度与派发
//!
//! 包含准入控制、时间/答案分布采样、周期调度循环与执行派发器。

pub mod admission;
pub mod dispatch;
pub mod distribution;
pub mod scheduler;

pub use admission::AdmissionController;
pub use dispatch::ExecutionDispatcher;
pub use scheduler::{sort_by_queue_order, CampaignScheduler};

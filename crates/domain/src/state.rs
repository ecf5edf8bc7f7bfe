//! 填充活动状态机
//!
//! 纯应用层逻辑，不依赖存储，可作为纯函数单元测试

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FillRequestStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "IN_PROCESS")]
    InProcess,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl fmt::Display for FillRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FillRequestStatus::Queued => "QUEUED",
            FillRequestStatus::InProcess => "IN_PROCESS",
            FillRequestStatus::Completed => "COMPLETED",
            FillRequestStatus::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// 判断一次状态流转是否合法
///
/// 合法边:
/// QUEUED -> IN_PROCESS, QUEUED -> FAILED,
/// IN_PROCESS -> COMPLETED, IN_PROCESS -> FAILED,
/// FAILED -> QUEUED (重试)。COMPLETED 为终态。
pub fn can_transition(from: FillRequestStatus, to: FillRequestStatus) -> bool {
    legal_transitions(from).contains(&to)
}

/// 返回某个状态的全部合法后继状态，供调用方在变更前校验
pub fn legal_transitions(from: FillRequestStatus) -> &'static [FillRequestStatus] {
    use FillRequestStatus::*;
    match from {
        Queued => &[InProcess, Failed],
        InProcess => &[Completed, Failed],
        Failed => &[Queued],
        Completed => &[],
    }
}

impl FillRequestStatus {
    pub fn is_terminal(&self) -> bool {
        legal_transitions(*self).is_empty()
    }
    pub fn is_queued(&self) -> bool {
        matches!(self, FillRequestStatus::Queued)
    }
    pub fn is_in_process(&self) -> bool {
        matches!(self, FillRequestStatus::InProcess)
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FillError {
    #[error("填充活动未找到: {id}")]
    CampaignNotFound { id: String },
    #[error("非法状态流转: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
    #[error("无效的答案分布: {0}")]
    InvalidDistribution(String),
    #[error("无效的投放窗口: {0}")]
    InvalidWindow(String),
    #[error("存储错误: {0}")]
    Storage(String),
    #[error("表单引擎错误: {0}")]
    Engine(String),
    #[error("实时推送错误: {0}")]
    Realtime(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type FillResult<T> = Result<T, FillError>;

impl FillError {
    pub fn campaign_not_found<S: ToString>(id: S) -> Self {
        Self::CampaignNotFound { id: id.to_string() }
    }
    pub fn illegal_transition<F: ToString, T: ToString>(from: F, to: T) -> Self {
        Self::IllegalTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
    pub fn invalid_distribution<S: Into<String>>(msg: S) -> Self {
        Self::InvalidDistribution(msg.into())
    }
    pub fn storage_error<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }
    pub fn engine_error<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    /// 致命错误不应由调度循环吞掉
    pub fn is_fatal(&self) -> bool {
        matches!(self, FillError::Internal(_) | FillError::Configuration(_))
    }
    /// 可在下一轮调度中自然恢复的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FillError::Storage(_) | FillError::Engine(_) | FillError::Realtime(_)
        )
    }
}

impl From<serde_json::Error> for FillError {
    fn from(err: serde_json::Error) -> Self {
        FillError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for FillError {
    fn from(err: anyhow::Error) -> Self {
        FillError::Internal(err.to_string())
    }
}

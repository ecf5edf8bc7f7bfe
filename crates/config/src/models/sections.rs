use formfill_errors::{FillError, FillResult};
use serde::{Deserialize, Serialize};

/// 调度循环配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// 主轮询间隔（秒）
    pub poll_interval_seconds: u64,
    /// 到期判定的前瞻窗口（秒）
    pub lookahead_seconds: i64,
    /// 并发执行槽位数
    pub worker_capacity: u32,
    /// 表单缓存清理间隔（秒）
    pub cache_sweep_interval_seconds: u64,
    /// 活动失败后的最大重试次数
    pub max_retries: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 30,
            lookahead_seconds: 60,
            worker_capacity: 4,
            cache_sweep_interval_seconds: 900,
            max_retries: 3,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> FillResult<()> {
        if self.worker_capacity < 1 {
            return Err(FillError::config_error("worker_capacity 必须 >= 1"));
        }
        if self.poll_interval_seconds == 0 {
            return Err(FillError::config_error("poll_interval_seconds 必须 > 0"));
        }
        if self.lookahead_seconds < 0 {
            return Err(FillError::config_error("lookahead_seconds 不能为负"));
        }
        Ok(())
    }
}

/// 实时推送配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    pub enabled: bool,
    /// websocket 服务监听地址
    pub bind_address: String,
    /// 单房间每个窗口内允许的最大帧数
    pub burst_max: u32,
    /// 单房间帧之间的最小间隔（毫秒），0 表示关闭
    pub publish_floor_ms: u64,
    /// 清理任务运行间隔（秒）
    pub sweep_interval_seconds: u64,
    /// 限流计数器空闲多久后被清理（秒）
    pub counter_idle_seconds: i64,
    /// 去重缓存上限
    pub dedup_max_entries: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8090".to_string(),
            burst_max: 10,
            publish_floor_ms: 250,
            sweep_interval_seconds: 300,
            counter_idle_seconds: 300,
            dedup_max_entries: 1000,
        }
    }
}

impl RealtimeConfig {
    pub fn validate(&self) -> FillResult<()> {
        if self.burst_max < 1 {
            return Err(FillError::config_error("burst_max 必须 >= 1"));
        }
        if self.enabled && self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(FillError::config_error(format!(
                "无效的监听地址: {}",
                self.bind_address
            )));
        }
        Ok(())
    }
}

/// 提交时间/答案抽样配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// 拟人化抖动幅度，占平均间隔的比例，取值 [0, 1]
    pub jitter_fraction: f64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            jitter_fraction: 0.5,
        }
    }
}

impl SamplerConfig {
    pub fn validate(&self) -> FillResult<()> {
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(FillError::config_error("jitter_fraction 必须在 [0, 1] 内"));
        }
        Ok(())
    }
}

/// 内置模拟引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 单次提交的成功概率
    pub success_rate: f64,
    /// 单次提交的模拟耗时（毫秒）
    pub submission_latency_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            success_rate: 0.98,
            submission_latency_ms: 20,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> FillResult<()> {
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(FillError::config_error("success_rate 必须在 [0, 1] 内"));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// true 输出 JSON 格式，否则人类可读格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> FillResult<()> {
        const LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
        if !LEVELS.contains(&self.level.as_str()) {
            return Err(FillError::config_error(format!(
                "无效的日志级别: {}",
                self.level
            )));
        }
        Ok(())
    }
}

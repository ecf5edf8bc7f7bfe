use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formfill_errors::{FillError, FillResult};

use crate::state::{can_transition, FillRequestStatus};

/// 批量填充活动聚合根
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRequest {
    pub id: Uuid,
    pub form_id: Uuid,
    pub user_id: Uuid,
    pub target_count: u32,
    pub completed_count: u32,
    pub price_cents: i64,
    pub human_like: bool, // 影响时间抖动
    pub priority: i32,    // 数值越大越优先
    pub queue_position: Option<i32>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: FillRequestStatus,
    pub mode: CampaignMode,
    pub answer_targets: Vec<AnswerTarget>,
    pub schedule: Option<Schedule>,
    pub created_at: DateTime<Utc>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// 活动的答案来源，创建时确定，运行期不再做类型探测
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum CampaignMode {
    /// 按目标百分比分布生成答案
    DistributionDriven,
    /// 由导入数据逐行驱动答案
    DataDriven { column_mappings: Vec<ColumnMapping> },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnMapping {
    pub column: String,
    pub question_id: Uuid,
}

/// 单个问题选项的目标占比
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerTarget {
    pub id: Uuid,
    pub question_id: Uuid,
    pub option_id: Option<Uuid>,
    /// 矩阵题的行
    pub row_id: Option<Uuid>,
    /// 填空题的固定文本
    pub text_value: Option<String>,
    pub percentage: u8,
    /// 已按此目标生成的提交数，用于收敛
    pub consumed_count: u32,
}

/// 投放时间窗口，与活动一一对应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub human_like: bool,
    pub batch_size: Option<u32>,
    pub current_batch: Option<u32>,
    pub total_batches: Option<u32>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

/// 一次计划提交：时间点 + 已解析的答案选择（临时对象，不持久化）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledSubmission {
    pub run_at: DateTime<Utc>,
    pub choices: Vec<AnswerChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerChoice {
    pub question_id: Uuid,
    pub option_id: Option<Uuid>,
    pub row_id: Option<Uuid>,
    pub text: Option<String>,
}

/// 提交给表单引擎的完整执行计划
#[derive(Debug, Clone)]
pub struct SubmissionPlan {
    pub campaign_id: Uuid,
    pub form_id: Uuid,
    pub human_like: bool,
    pub submissions: Vec<ScheduledSubmission>,
}

/// 表单引擎一次执行的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub succeeded: u32,
    pub failed: u32,
}

impl SubmissionOutcome {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl FillRequest {
    pub fn new(form_id: Uuid, user_id: Uuid, target_count: u32, mode: CampaignMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            form_id,
            user_id,
            target_count,
            completed_count: 0,
            price_cents: 0,
            human_like: false,
            priority: 0,
            queue_position: None,
            retry_count: 0,
            max_retries: 3,
            status: FillRequestStatus::Queued,
            mode,
            answer_targets: Vec::new(),
            schedule: None,
            created_at: now,
            start_at: None,
            end_at: None,
        }
    }

    /// 剩余待提交数量
    pub fn remaining(&self) -> u32 {
        self.target_count.saturating_sub(self.completed_count)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 可重试：处于 FAILED 且未用尽重试次数
    pub fn can_retry(&self) -> bool {
        matches!(self.status, FillRequestStatus::Failed) && self.retry_count < self.max_retries
    }

    /// 调度使用的生效开始时间，未显式指定则视为立即可调度
    pub fn effective_start(&self) -> Option<DateTime<Utc>> {
        self.schedule.as_ref().map(|s| s.start_at).or(self.start_at)
    }

    /// 校验后变更状态，非法流转时拒绝且不做任何修改
    pub fn transition_to(&mut self, to: FillRequestStatus) -> FillResult<()> {
        if !can_transition(self.status, to) {
            return Err(FillError::illegal_transition(self.status, to));
        }
        self.status = to;
        match to {
            FillRequestStatus::InProcess => {
                if self.start_at.is_none() {
                    self.start_at = Some(Utc::now());
                }
            }
            FillRequestStatus::Completed | FillRequestStatus::Failed => {
                self.end_at = Some(Utc::now());
            }
            _ => {}
        }
        Ok(())
    }

    /// 累计完成数，封顶到目标值
    pub fn record_completed(&mut self, n: u32) {
        self.completed_count = (self.completed_count + n).min(self.target_count);
    }

    /// FAILED -> QUEUED 重试，分配新的队尾位置
    pub fn prepare_retry(&mut self, next_position: i32) -> FillResult<()> {
        if !self.can_retry() {
            return Err(FillError::illegal_transition(
                self.status,
                FillRequestStatus::Queued,
            ));
        }
        self.transition_to(FillRequestStatus::Queued)?;
        self.retry_count += 1;
        self.queue_position = Some(next_position);
        self.end_at = None;
        Ok(())
    }

    /// 创建期校验：运行期的采样器假定输入已通过此校验
    pub fn validate(&self) -> FillResult<()> {
        if self.target_count == 0 {
            return Err(FillError::invalid_distribution("目标提交数必须大于0"));
        }
        if self.completed_count > self.target_count {
            return Err(FillError::invalid_distribution("已完成数超过目标数"));
        }
        if let Some(schedule) = &self.schedule {
            if schedule.end_at <= schedule.start_at {
                return Err(FillError::InvalidWindow(format!(
                    "窗口结束时间 {} 不晚于开始时间 {}",
                    schedule.end_at, schedule.start_at
                )));
            }
        }
        if matches!(self.mode, CampaignMode::DistributionDriven) {
            self.validate_answer_targets()?;
        }
        Ok(())
    }

    /// 每个问题下的目标百分比之和必须为100
    fn validate_answer_targets(&self) -> FillResult<()> {
        use std::collections::HashMap;
        if self.answer_targets.is_empty() {
            return Err(FillError::invalid_distribution(
                "分布驱动的活动缺少答案目标",
            ));
        }
        let mut sums: HashMap<Uuid, u32> = HashMap::new();
        for target in &self.answer_targets {
            if target.percentage > 100 {
                return Err(FillError::invalid_distribution(format!(
                    "答案目标 {} 的百分比 {} 超出范围",
                    target.id, target.percentage
                )));
            }
            *sums.entry(target.question_id).or_insert(0) += target.percentage as u32;
        }
        for (question_id, sum) in sums {
            if sum != 100 {
                return Err(FillError::invalid_distribution(format!(
                    "问题 {question_id} 的目标百分比之和为 {sum}，应为 100"
                )));
            }
        }
        Ok(())
    }

    /// 某个问题下的全部答案目标
    pub fn targets_for_question(&self, question_id: Uuid) -> Vec<&AnswerTarget> {
        self.answer_targets
            .iter()
            .filter(|t| t.question_id == question_id)
            .collect()
    }

    /// 按出现顺序列出涉及的问题（去重）
    pub fn question_ids(&self) -> Vec<Uuid> {
        let mut seen = Vec::new();
        for target in &self.answer_targets {
            if !seen.contains(&target.question_id) {
                seen.push(target.question_id);
            }
        }
        seen
    }

    pub fn entity_description(&self) -> String {
        format!(
            "填充活动 {} (表单: {}, 进度: {}/{})",
            self.id, self.form_id, self.completed_count, self.target_count
        )
    }
}

impl AnswerTarget {
    pub fn new(question_id: Uuid, option_id: Option<Uuid>, percentage: u8) -> Self {
        Self {
            id: Uuid::new_v4(),
            question_id,
            option_id,
            row_id: None,
            text_value: None,
            percentage,
            consumed_count: 0,
        }
    }

    pub fn into_choice(&self) -> AnswerChoice {
        AnswerChoice {
            question_id: self.question_id,
            option_id: self.option_id,
            row_id: self.row_id,
            text: self.text_value.clone(),
        }
    }
}

impl Schedule {
    pub fn new(start_at: DateTime<Utc>, end_at: DateTime<Utc>, human_like: bool) -> Self {
        Self {
            start_at,
            end_at,
            human_like,
            batch_size: None,
            current_batch: None,
            total_batches: None,
            estimated_completion: None,
        }
    }

    /// 按批次大小刷新批次进度与预计完成时间
    pub fn refresh_batches(&mut self, completed: u32, target: u32, now: DateTime<Utc>) {
        if let Some(batch_size) = self.batch_size.filter(|b| *b > 0) {
            let total = target.div_ceil(batch_size);
            self.total_batches = Some(total);
            self.current_batch = Some((completed / batch_size).min(total));
        }
        if completed > 0 && completed < target {
            let elapsed = now - self.start_at;
            if elapsed > chrono::Duration::zero() {
                let per_unit = elapsed / completed as i32;
                self.estimated_completion = Some(now + per_unit * (target - completed) as i32);
            }
        } else if completed >= target {
            self.estimated_completion = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn distribution_campaign() -> FillRequest {
        let question = Uuid::new_v4();
        let mut req = FillRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            10,
            CampaignMode::DistributionDriven,
        );
        req.answer_targets = vec![
            AnswerTarget::new(question, Some(Uuid::new_v4()), 70),
            AnswerTarget::new(question, Some(Uuid::new_v4()), 30),
        ];
        req
    }

    #[test]
    fn test_validate_accepts_sum_100() {
        assert!(distribution_campaign().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_sum() {
        let mut req = distribution_campaign();
        req.answer_targets[0].percentage = 60;
        let err = req.validate().unwrap_err();
        assert!(matches!(err, FillError::InvalidDistribution(_)));
    }

    #[test]
    fn test_validate_rejects_zero_target() {
        let mut req = distribution_campaign();
        req.target_count = 0;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_transition_rejected_without_mutation() {
        let mut req = distribution_campaign();
        req.status = FillRequestStatus::InProcess;
        let err = req.transition_to(FillRequestStatus::Queued).unwrap_err();
        assert!(matches!(err, FillError::IllegalTransition { .. }));
        assert_eq!(req.status, FillRequestStatus::InProcess);
    }

    #[test]
    fn test_prepare_retry_assigns_fresh_position() {
        let mut req = distribution_campaign();
        req.transition_to(FillRequestStatus::InProcess).unwrap();
        req.transition_to(FillRequestStatus::Failed).unwrap();
        req.prepare_retry(9).unwrap();
        assert_eq!(req.status, FillRequestStatus::Queued);
        assert_eq!(req.retry_count, 1);
        assert_eq!(req.queue_position, Some(9));
    }

    #[test]
    fn test_prepare_retry_exhausted() {
        let mut req = distribution_campaign();
        req.max_retries = 1;
        req.retry_count = 1;
        req.status = FillRequestStatus::Failed;
        assert!(req.prepare_retry(3).is_err());
        assert_eq!(req.status, FillRequestStatus::Failed);
    }

    #[test]
    fn test_record_completed_is_capped() {
        let mut req = distribution_campaign();
        req.record_completed(25);
        assert_eq!(req.completed_count, 10);
        assert_eq!(req.remaining(), 0);
    }

    #[test]
    fn test_schedule_refresh_batches() {
        let start = Utc::now() - chrono::Duration::seconds(100);
        let mut schedule = Schedule::new(start, start + chrono::Duration::hours(1), false);
        schedule.batch_size = Some(4);
        schedule.refresh_batches(5, 10, Utc::now());
        assert_eq!(schedule.total_batches, Some(3));
        assert_eq!(schedule.current_batch, Some(1));
        assert!(schedule.estimated_completion.is_some());
    }
}

//! 执行派发器
//!
//! 把被放行的活动变成一次异步的表单引擎调用：
//! 状态流转、构建提交计划、fire-and-forget 派发，
//! 并在完成回调中更新存储、处理重试与推送进度。

use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, error, info, warn};

use formfill_domain::{
    AnswerChoice, BalanceEvent, CampaignMode, FillRequest, FillRequestRepository,
    FillRequestStatus, FormFillEngine, ProgressEvent, ProgressNotifier, ScheduledSubmission,
    SubmissionOutcome, SubmissionPlan,
};
use formfill_errors::FillResult;

use crate::admission::AdmissionController;
use crate::distribution::{build_schedule, QuotaSampler};

#[derive(Clone)]
pub struct ExecutionDispatcher {
    repo: Arc<dyn FillRequestRepository>,
    engine: Arc<dyn FormFillEngine>,
    notifier: Arc<dyn ProgressNotifier>,
    admission: Arc<AdmissionController>,
    jitter_fraction: f64,
}

impl ExecutionDispatcher {
    pub fn new(
        repo: Arc<dyn FillRequestRepository>,
        engine: Arc<dyn FormFillEngine>,
        notifier: Arc<dyn ProgressNotifier>,
        admission: Arc<AdmissionController>,
        jitter_fraction: f64,
    ) -> Self {
        Self {
            repo,
            engine,
            notifier,
            admission,
            jitter_fraction,
        }
    }

    /// 尝试启动一个活动
    ///
    /// 返回 Ok(false) 表示容量不足（不是错误，活动留在队列中等下一轮）。
    /// 状态流转失败或存储失败时释放已占用的槽位并上抛。
    pub async fn start_campaign(&self, campaign: FillRequest) -> FillResult<bool> {
        if !self.admission.try_acquire() {
            debug!("容量不足，活动 {} 继续排队", campaign.id);
            return Ok(false);
        }

        match self.admit_and_spawn(campaign).await {
            Ok(()) => Ok(true),
            Err(e) => {
                self.admission.release();
                Err(e)
            }
        }
    }

    async fn admit_and_spawn(&self, mut campaign: FillRequest) -> FillResult<()> {
        let left_position = campaign.queue_position;

        campaign.transition_to(FillRequestStatus::InProcess)?;
        campaign.queue_position = None;

        let plan = self.build_plan(&mut campaign)?;
        self.repo.update(&campaign).await?;
        if let Some(position) = left_position {
            // 保持 QUEUED 集合内位置紧凑
            self.repo.compact_positions_above(position).await?;
        }

        info!(
            "活动 {} 进入执行，计划提交 {} 次",
            campaign.id,
            plan.submissions.len()
        );
        self.notifier
            .campaign_progress(ProgressEvent::from_request(&campaign))
            .await;

        let dispatcher = self.clone();
        tokio::spawn(async move {
            dispatcher.run_to_completion(campaign, plan).await;
        });

        Ok(())
    }

    /// 按活动模式构建提交计划
    ///
    /// 分布驱动：每个问题一个配额采样器（以已消费计数为起点），
    /// 逐次提交采样出具体选择，并把消费计数写回聚合以便续跑收敛。
    /// 数据驱动：答案由引擎按列映射从导入数据逐行解析，计划只带时间点。
    fn build_plan(&self, campaign: &mut FillRequest) -> FillResult<SubmissionPlan> {
        let mut rng = StdRng::from_os_rng();

        let (start, end, human_like) = match &campaign.schedule {
            Some(schedule) => (schedule.start_at, schedule.end_at, schedule.human_like),
            None => {
                let now = Utc::now();
                (now, now, campaign.human_like)
            }
        };

        let slots = build_schedule(
            campaign.remaining(),
            start,
            end,
            human_like,
            self.jitter_fraction,
            Utc::now(),
            &mut rng,
        );

        let submissions = match &campaign.mode {
            CampaignMode::DataDriven { .. } => slots
                .into_iter()
                .map(|run_at| ScheduledSubmission {
                    run_at,
                    choices: Vec::new(),
                })
                .collect(),
            CampaignMode::DistributionDriven => {
                self.sample_distribution_choices(campaign, slots, &mut rng)
            }
        };

        Ok(SubmissionPlan {
            campaign_id: campaign.id,
            form_id: campaign.form_id,
            human_like,
            submissions,
        })
    }

    fn sample_distribution_choices(
        &self,
        campaign: &mut FillRequest,
        slots: Vec<chrono::DateTime<Utc>>,
        rng: &mut StdRng,
    ) -> Vec<ScheduledSubmission> {
        // (问题, 该问题目标在 answer_targets 中的下标, 采样器)
        let mut samplers: Vec<(Vec<usize>, QuotaSampler)> = campaign
            .question_ids()
            .into_iter()
            .map(|question_id| {
                let indices: Vec<usize> = campaign
                    .answer_targets
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.question_id == question_id)
                    .map(|(idx, _)| idx)
                    .collect();
                let targets: Vec<&_> = indices
                    .iter()
                    .map(|idx| &campaign.answer_targets[*idx])
                    .collect();
                let sampler = QuotaSampler::from_targets(&targets, campaign.target_count);
                (indices, sampler)
            })
            .collect();

        let submissions = slots
            .into_iter()
            .map(|run_at| {
                let choices: Vec<AnswerChoice> = samplers
                    .iter_mut()
                    .filter_map(|(indices, sampler)| {
                        sampler
                            .next(rng)
                            .map(|picked| campaign.answer_targets[indices[picked]].into_choice())
                    })
                    .collect();
                ScheduledSubmission { run_at, choices }
            })
            .collect();

        // 写回消费计数，FAILED 重试时据此继续收敛
        for (indices, sampler) in &samplers {
            for (slot, target_idx) in indices.iter().enumerate() {
                campaign.answer_targets[*target_idx].consumed_count = sampler.consumed()[slot];
            }
        }

        submissions
    }

    /// 完成回调：可能在任意线程上执行，绝不让错误冒泡出去
    async fn run_to_completion(&self, campaign: FillRequest, plan: SubmissionPlan) {
        let campaign_id = campaign.id;
        let result = self.engine.submit(plan).await;
        self.admission.release();

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("活动 {} 的引擎调用失败: {}", campaign_id, e);
                SubmissionOutcome {
                    succeeded: 0,
                    failed: campaign.remaining(),
                }
            }
        };

        if let Err(e) = self.settle_outcome(campaign, outcome).await {
            error!("活动 {} 的完成处理失败: {}", campaign_id, e);
        }
    }

    async fn settle_outcome(
        &self,
        mut campaign: FillRequest,
        outcome: SubmissionOutcome,
    ) -> FillResult<()> {
        if outcome.succeeded > 0 {
            campaign.record_completed(outcome.succeeded);
            self.repo
                .increment_completed(campaign.id, outcome.succeeded)
                .await?;
        }

        let now = Utc::now();
        if let Some(schedule) = campaign.schedule.as_mut() {
            schedule.refresh_batches(campaign.completed_count, campaign.target_count, now);
        }

        if campaign.remaining() == 0 {
            campaign.transition_to(FillRequestStatus::Completed)?;
            info!("活动 {} 已完成全部 {} 次提交", campaign.id, campaign.target_count);
        } else {
            campaign.transition_to(FillRequestStatus::Failed)?;
            if campaign.can_retry() {
                let position = self.repo.next_queue_position().await?;
                campaign.prepare_retry(position)?;
                info!(
                    "活动 {} 部分失败 ({}/{})，第 {} 次重试已重新入队",
                    campaign.id, campaign.completed_count, campaign.target_count,
                    campaign.retry_count
                );
            } else {
                warn!(
                    "活动 {} 已用尽 {} 次重试，保持失败状态",
                    campaign.id, campaign.max_retries
                );
            }
        }

        self.repo.update(&campaign).await?;
        self.notifier
            .campaign_progress(ProgressEvent::from_request(&campaign))
            .await;

        if outcome.succeeded > 0 && campaign.price_cents > 0 {
            self.notifier
                .balance_changed(BalanceEvent {
                    owner_id: campaign.user_id,
                    value_cents: campaign.price_cents * outcome.succeeded as i64,
                    updated_at: now,
                })
                .await;
        }

        Ok(())
    }
}

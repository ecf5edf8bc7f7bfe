//! 分布采样器
//!
//! 两个独立职责：
//! 1. 时间分布：把剩余提交数摊到投放窗口内，可选"拟人"抖动；
//! 2. 答案分布：按目标百分比生成逐次选择，保证在有限次提交内
//!    精确收敛到各目标的配额，而不是仅概率意义上的近似。
//!
//! 全部为纯函数/纯结构，时间与随机源由调用方注入。

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use formfill_domain::AnswerTarget;

/// 在 `[max(now, start), end]` 内生成 `remaining` 个单调递增的提交时间点。
///
/// 默认等间距；`human_like` 时对每个槽位加入 ±(jitter_fraction × 平均间隔)
/// 的随机抖动，抖动后裁剪回窗口并重新排序以保持单调。
/// 窗口已完全过期时全部压缩为"尽快执行"。
pub fn build_schedule<R: Rng + ?Sized>(
    remaining: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    human_like: bool,
    jitter_fraction: f64,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Vec<DateTime<Utc>> {
    if remaining == 0 {
        return Vec::new();
    }

    let effective_start = start.max(now);
    if end <= effective_start {
        // 窗口已经在过去，剩余提交全部立即执行
        return vec![now; remaining as usize];
    }

    let window_ms = (end - effective_start).num_milliseconds();
    let step_ms = window_ms / remaining as i64;
    let mut slots: Vec<DateTime<Utc>> = (0..remaining as i64)
        .map(|i| effective_start + Duration::milliseconds(step_ms * i + step_ms / 2))
        .collect();

    if human_like && step_ms > 0 {
        let bound = (step_ms as f64 * jitter_fraction).abs();
        for slot in slots.iter_mut() {
            let jitter_ms = (bound * (rng.random::<f64>() - 0.5) * 2.0) as i64;
            let mut jittered = *slot + Duration::milliseconds(jitter_ms);
            if jittered < effective_start {
                jittered = effective_start;
            }
            if jittered > end {
                jittered = end;
            }
            *slot = jittered;
        }
        slots.sort();
    }

    slots
}

/// 按 `round(pᵢ/100 × n)` 计算各目标的精确配额，并把舍入余差
/// （可正可负）按百分比从大到小逐个分摊，使配额之和恰好等于 n。
/// 负余差只从仍有配额的目标上扣除，任何配额都不会被扣成负数。
pub fn allocate_quotas(percentages: &[u8], n: u32) -> Vec<u32> {
    if percentages.is_empty() || n == 0 {
        return vec![0; percentages.len()];
    }

    let mut quotas: Vec<u32> = percentages
        .iter()
        .map(|p| ((*p as f64 / 100.0) * n as f64).round() as u32)
        .collect();

    // 百分比降序、同分取下标小者；余差超过单个目标时循环继续分摊
    let mut order: Vec<usize> = (0..percentages.len()).collect();
    order.sort_by_key(|&idx| (std::cmp::Reverse(percentages[idx]), idx));

    let mut remainder = n as i64 - quotas.iter().map(|q| *q as i64).sum::<i64>();
    let mut cursor = 0usize;
    while remainder != 0 {
        let idx = order[cursor % order.len()];
        cursor += 1;
        if remainder > 0 {
            quotas[idx] += 1;
            remainder -= 1;
        } else if quotas[idx] > 0 {
            quotas[idx] -= 1;
            remainder += 1;
        }
    }

    quotas
}

/// 单个问题的配额收敛采样器
///
/// 每次选择都在"仍有剩余配额"的目标间按剩余配额加权随机，
/// 因此聚合结果精确命中配额，且最后一次选择必然落在
/// 唯一仍有余量的目标上（保证终止）。
#[derive(Debug, Clone)]
pub struct QuotaSampler {
    quotas: Vec<u32>,
    consumed: Vec<u32>,
}

impl QuotaSampler {
    /// `consumed` 用于续跑的活动：从已记录的计数继续收敛
    pub fn new(quotas: Vec<u32>, consumed: Vec<u32>) -> Self {
        debug_assert_eq!(quotas.len(), consumed.len());
        Self { quotas, consumed }
    }

    /// 从一个问题的答案目标构建：按总提交数分配配额，
    /// 并以各目标已消费计数作为起点
    pub fn from_targets(targets: &[&AnswerTarget], total: u32) -> Self {
        let percentages: Vec<u8> = targets.iter().map(|t| t.percentage).collect();
        let quotas = allocate_quotas(&percentages, total);
        let consumed = targets.iter().map(|t| t.consumed_count).collect();
        Self::new(quotas, consumed)
    }

    pub fn remaining_total(&self) -> u32 {
        self.quotas
            .iter()
            .zip(&self.consumed)
            .map(|(q, c)| q.saturating_sub(*c))
            .sum()
    }

    pub fn consumed(&self) -> &[u32] {
        &self.consumed
    }

    /// 选择下一个目标的下标并消费其一个配额；全部配额耗尽时返回 None
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<usize> {
        let total = self.remaining_total();
        if total == 0 {
            return None;
        }
        let mut pick = rng.random_range(0..total);
        for (idx, (quota, consumed)) in self.quotas.iter().zip(self.consumed.iter_mut()).enumerate()
        {
            let weight = quota.saturating_sub(*consumed);
            if weight == 0 {
                continue;
            }
            if pick < weight {
                *consumed += 1;
                return Some(idx);
            }
            pick -= weight;
        }
        None
    }
}

use async_trait::async_trait;
use formfill_domain::entities::{SubmissionOutcome, SubmissionPlan};
use formfill_domain::ports::{FormCache, FormFillEngine};
use formfill_errors::FillResult;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Simulated browser engine for embedded and development deployments.
///
/// Rolls each submission against a configurable success rate instead of
/// driving a real browser. Scheduled run times are ignored; the batch is
/// played back with a single artificial latency per submission.
pub struct SimulatedFormEngine {
    success_rate: f64,
    submission_latency: Duration,
    rng: Mutex<StdRng>,
}

impl SimulatedFormEngine {
    pub fn new(success_rate: f64, submission_latency_ms: u64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            submission_latency: Duration::from_millis(submission_latency_ms),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(success_rate: f64, submission_latency_ms: u64, seed: u64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
            submission_latency: Duration::from_millis(submission_latency_ms),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

#[async_trait]
impl FormFillEngine for SimulatedFormEngine {
    async fn submit(&self, plan: SubmissionPlan) -> FillResult<SubmissionOutcome> {
        let total = plan.submissions.len() as u32;
        info!(
            campaign_id = %plan.campaign_id,
            form_id = %plan.form_id,
            submissions = total,
            "simulated engine received plan"
        );

        if !self.submission_latency.is_zero() {
            tokio::time::sleep(self.submission_latency * total).await;
        }

        let mut succeeded = 0;
        {
            let mut rng = self.rng.lock().await;
            for _ in 0..total {
                if rng.random::<f64>() < self.success_rate {
                    succeeded += 1;
                }
            }
        }

        let outcome = SubmissionOutcome {
            succeeded,
            failed: total - succeeded,
        };
        debug!(
            campaign_id = %plan.campaign_id,
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            "simulated engine finished plan"
        );
        Ok(outcome)
    }
}

/// Look-aside cache for rendered form definitions.
///
/// The scheduler only needs the full-invalidation hook; readers populate
/// and consult entries on their own cadence.
#[derive(Debug, Default)]
pub struct InMemoryFormCache {
    entries: Arc<RwLock<HashMap<Uuid, Value>>>,
}

impl InMemoryFormCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, form_id: Uuid, definition: Value) {
        self.entries.write().await.insert(form_id, definition);
    }

    pub async fn get(&self, form_id: Uuid) -> Option<Value> {
        self.entries.read().await.get(&form_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl FormCache for InMemoryFormCache {
    async fn invalidate_all(&self) -> FillResult<usize> {
        let mut entries = self.entries.write().await;
        let purged = entries.len();
        entries.clear();
        if purged > 0 {
            info!(purged, "form definition cache invalidated");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plan(submissions: u32) -> SubmissionPlan {
        SubmissionPlan {
            campaign_id: Uuid::new_v4(),
            form_id: Uuid::new_v4(),
            human_like: false,
            submissions: (0..submissions)
                .map(|_| formfill_domain::entities::ScheduledSubmission {
                    run_at: chrono::Utc::now(),
                    choices: Vec::new(),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_full_success_rate_completes_everything() {
        let engine = SimulatedFormEngine::new(1.0, 0);
        let outcome = engine.submit(plan(25)).await.unwrap();
        assert_eq!(outcome.succeeded, 25);
        assert_eq!(outcome.failed, 0);
    }

    #[tokio::test]
    async fn test_zero_success_rate_fails_everything() {
        let engine = SimulatedFormEngine::new(0.0, 0);
        let outcome = engine.submit(plan(25)).await.unwrap();
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 25);
    }

    #[tokio::test]
    async fn test_seeded_engine_is_deterministic() {
        let a = SimulatedFormEngine::with_seed(0.5, 0, 42);
        let b = SimulatedFormEngine::with_seed(0.5, 0, 42);
        let plan_a = plan(100);
        let mut plan_b = plan(100);
        plan_b.campaign_id = plan_a.campaign_id;

        let outcome_a = a.submit(plan_a).await.unwrap();
        let outcome_b = b.submit(plan_b).await.unwrap();
        assert_eq!(outcome_a.succeeded, outcome_b.succeeded);
    }

    #[tokio::test]
    async fn test_cache_invalidation_reports_purged_count() {
        let cache = InMemoryFormCache::new();
        cache.put(Uuid::new_v4(), json!({"title": "问卷 A"})).await;
        cache.put(Uuid::new_v4(), json!({"title": "问卷 B"})).await;

        assert_eq!(cache.invalidate_all().await.unwrap(), 2);
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.invalidate_all().await.unwrap(), 0);
    }
}

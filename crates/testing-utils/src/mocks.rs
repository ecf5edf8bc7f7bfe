//! Mock implementations for engine, cache and notifier ports
//!
//! This module provides in-memory test doubles that record their
//! interactions, so tests can assert on dispatch behavior without a
//! real browser engine or transport.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use formfill_domain::entities::{SubmissionOutcome, SubmissionPlan};
use formfill_domain::events::{BalanceEvent, ProgressEvent};
use formfill_domain::ports::{FormCache, FormFillEngine, ProgressNotifier};
use formfill_errors::{FillError, FillResult};

/// Mock form-fill engine with scriptable outcomes
///
/// Outcomes are consumed in FIFO order; when the script is empty the
/// engine reports full success for the submitted plan.
#[derive(Clone, Default)]
pub struct MockFormFillEngine {
    outcomes: Arc<Mutex<VecDeque<FillResult<SubmissionOutcome>>>>,
    submitted: Arc<Mutex<Vec<SubmissionPlan>>>,
}

impl MockFormFillEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, outcome: SubmissionOutcome) {
        self.outcomes.lock().unwrap().push_back(Ok(outcome));
    }

    pub fn push_failure(&self, message: &str) {
        self.outcomes
            .lock()
            .unwrap()
            .push_back(Err(FillError::engine_error(message)));
    }

    pub fn submitted_plans(&self) -> Vec<SubmissionPlan> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }
}

#[async_trait]
impl FormFillEngine for MockFormFillEngine {
    async fn submit(&self, plan: SubmissionPlan) -> FillResult<SubmissionOutcome> {
        let planned = plan.submissions.len() as u32;
        self.submitted.lock().unwrap().push(plan);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(SubmissionOutcome {
                succeeded: planned,
                failed: 0,
            }),
        }
    }
}

/// Form cache that counts sweeps
#[derive(Clone, Default)]
pub struct MockFormCache {
    sweeps: Arc<Mutex<u32>>,
    fail: Arc<Mutex<bool>>,
}

impl MockFormCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sweep_count(&self) -> u32 {
        *self.sweeps.lock().unwrap()
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl FormCache for MockFormCache {
    async fn invalidate_all(&self) -> FillResult<usize> {
        if std::mem::take(&mut *self.fail.lock().unwrap()) {
            return Err(FillError::Internal("cache backend unavailable".to_string()));
        }
        *self.sweeps.lock().unwrap() += 1;
        Ok(3)
    }
}

/// Notifier that records every published event
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    progress: Arc<Mutex<Vec<ProgressEvent>>>,
    balance: Arc<Mutex<Vec<BalanceEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.progress.lock().unwrap().clone()
    }

    pub fn balance_events(&self) -> Vec<BalanceEvent> {
        self.balance.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressNotifier for RecordingNotifier {
    async fn campaign_progress(&self, event: ProgressEvent) {
        self.progress.lock().unwrap().push(event);
    }

    async fn balance_changed(&self, event: BalanceEvent) {
        self.balance.lock().unwrap().push(event);
    }
}

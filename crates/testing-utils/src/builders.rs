//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use formfill_domain::entities::{AnswerTarget, CampaignMode, FillRequest, Schedule};
use formfill_domain::state::FillRequestStatus;

/// Builder for creating test FillRequest entities
pub struct FillRequestBuilder {
    request: FillRequest,
}

impl FillRequestBuilder {
    pub fn new() -> Self {
        Self {
            request: FillRequest::new(
                Uuid::new_v4(),
                Uuid::new_v4(),
                10,
                CampaignMode::DistributionDriven,
            ),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.request.id = id;
        self
    }

    pub fn with_form_id(mut self, form_id: Uuid) -> Self {
        self.request.form_id = form_id;
        self
    }

    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.request.user_id = user_id;
        self
    }

    pub fn with_target_count(mut self, target_count: u32) -> Self {
        self.request.target_count = target_count;
        self
    }

    pub fn with_completed_count(mut self, completed_count: u32) -> Self {
        self.request.completed_count = completed_count;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.request.priority = priority;
        self
    }

    pub fn with_queue_position(mut self, position: i32) -> Self {
        self.request.queue_position = Some(position);
        self
    }

    pub fn with_status(mut self, status: FillRequestStatus) -> Self {
        self.request.status = status;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.request.max_retries = max_retries;
        self
    }

    pub fn with_price_cents(mut self, price_cents: i64) -> Self {
        self.request.price_cents = price_cents;
        self
    }

    pub fn with_mode(mut self, mode: CampaignMode) -> Self {
        self.request.mode = mode;
        self
    }

    /// Attach a schedule window relative to now
    pub fn with_window(mut self, start_in_seconds: i64, duration_seconds: i64) -> Self {
        let start = Utc::now() + Duration::seconds(start_in_seconds);
        self.request.schedule = Some(Schedule::new(
            start,
            start + Duration::seconds(duration_seconds),
            self.request.human_like,
        ));
        self
    }

    pub fn with_schedule(mut self, schedule: Schedule) -> Self {
        self.request.schedule = Some(schedule);
        self
    }

    pub fn human_like(mut self) -> Self {
        self.request.human_like = true;
        if let Some(schedule) = self.request.schedule.as_mut() {
            schedule.human_like = true;
        }
        self
    }

    /// Add one question with targets at the given percentages
    pub fn with_question(mut self, percentages: &[u8]) -> Self {
        let question_id = Uuid::new_v4();
        for percentage in percentages {
            self.request.answer_targets.push(AnswerTarget::new(
                question_id,
                Some(Uuid::new_v4()),
                *percentage,
            ));
        }
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.request.created_at = created_at;
        self
    }

    pub fn build(self) -> FillRequest {
        self.request
    }
}

impl Default for FillRequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use formfill_domain::entities::FillRequest;
use formfill_domain::repositories::FillRequestRepository;
use formfill_domain::state::FillRequestStatus;
use formfill_errors::{FillError, FillResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// In-memory fill request store.
///
/// Backs embedded deployments and the integration test suite. Queue
/// positions are kept dense: releasing a slot shifts every request
/// behind it forward by one.
#[derive(Debug, Default)]
pub struct MemoryFillRequestRepository {
    requests: Arc<RwLock<HashMap<Uuid, FillRequest>>>,
}

impl MemoryFillRequestRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored requests, regardless of status.
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }

    /// Snapshot of every stored request; room state fan-out filters this.
    pub async fn all(&self) -> Vec<FillRequest> {
        self.requests.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl FillRequestRepository for MemoryFillRequestRepository {
    async fn create(&self, request: &FillRequest) -> FillResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(FillError::storage_error(format!(
                "fill request already exists: {}",
                request.id
            )));
        }
        debug!(campaign_id = %request.id, "storing fill request");
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> FillResult<Option<FillRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn update(&self, request: &FillRequest) -> FillResult<()> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id) {
            Some(stored) => {
                *stored = request.clone();
                Ok(())
            }
            None => Err(FillError::campaign_not_found(request.id.to_string())),
        }
    }

    async fn update_status(&self, id: Uuid, status: FillRequestStatus) -> FillResult<()> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id) {
            Some(stored) => {
                stored.transition_to(status)?;
                Ok(())
            }
            None => Err(FillError::campaign_not_found(id.to_string())),
        }
    }

    async fn find_due_queued(&self, before: DateTime<Utc>) -> FillResult<Vec<FillRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| {
                r.status.is_queued() && r.effective_start().map_or(true, |start| start <= before)
            })
            .cloned()
            .collect())
    }

    async fn find_queued(&self) -> FillResult<Vec<FillRequest>> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .filter(|r| r.status.is_queued())
            .cloned()
            .collect())
    }

    async fn next_queue_position(&self) -> FillResult<i32> {
        let requests = self.requests.read().await;
        let max = requests
            .values()
            .filter_map(|r| r.queue_position)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn compact_positions_above(&self, position: i32) -> FillResult<()> {
        let mut requests = self.requests.write().await;
        for request in requests.values_mut() {
            if let Some(pos) = request.queue_position {
                if pos > position {
                    request.queue_position = Some(pos - 1);
                }
            }
        }
        Ok(())
    }

    async fn increment_completed(&self, id: Uuid, count: u32) -> FillResult<u32> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&id) {
            Some(stored) => {
                stored.record_completed(count);
                Ok(stored.completed_count)
            }
            None => Err(FillError::campaign_not_found(id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use formfill_testing_utils::FillRequestBuilder;

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = MemoryFillRequestRepository::new();
        let request = FillRequestBuilder::new().with_target_count(10).build();
        repo.create(&request).await.unwrap();

        let fetched = repo.get_by_id(request.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, request.id);
        assert_eq!(fetched.target_count, 10);
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let repo = MemoryFillRequestRepository::new();
        let request = FillRequestBuilder::new().build();
        repo.create(&request).await.unwrap();
        assert!(repo.create(&request).await.is_err());
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let repo = MemoryFillRequestRepository::new();
        let request = FillRequestBuilder::new().build();
        let err = repo.update(&request).await.unwrap_err();
        assert!(matches!(err, FillError::CampaignNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_status_enforces_transitions() {
        let repo = MemoryFillRequestRepository::new();
        let request = FillRequestBuilder::new().build();
        repo.create(&request).await.unwrap();

        repo.update_status(request.id, FillRequestStatus::InProcess)
            .await
            .unwrap();
        // IN_PROCESS 不能直接回到 QUEUED
        let err = repo
            .update_status(request.id, FillRequestStatus::Queued)
            .await
            .unwrap_err();
        assert!(matches!(err, FillError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_find_due_queued_respects_start_time() {
        let repo = MemoryFillRequestRepository::new();
        let now = Utc::now();

        let due = FillRequestBuilder::new()
            .with_window(-60, 3600)
            .build();
        let future = FillRequestBuilder::new()
            .with_window(7200, 3600)
            .build();
        repo.create(&due).await.unwrap();
        repo.create(&future).await.unwrap();

        let found = repo
            .find_due_queued(now + Duration::seconds(60))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, due.id);
    }

    #[tokio::test]
    async fn test_compact_positions_stays_dense() {
        let repo = MemoryFillRequestRepository::new();
        for pos in 1..=4 {
            let request = FillRequestBuilder::new().with_queue_position(pos).build();
            repo.create(&request).await.unwrap();
        }

        // 位置 2 的活动离开队列后，后面的活动全部前移
        repo.compact_positions_above(2).await.unwrap();

        let mut positions: Vec<i32> = repo
            .find_queued()
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.queue_position)
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, vec![1, 2, 2, 3]);
    }

    #[tokio::test]
    async fn test_next_queue_position_is_tail() {
        let repo = MemoryFillRequestRepository::new();
        assert_eq!(repo.next_queue_position().await.unwrap(), 1);

        let request = FillRequestBuilder::new().with_queue_position(7).build();
        repo.create(&request).await.unwrap();
        assert_eq!(repo.next_queue_position().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_increment_completed_is_capped() {
        let repo = MemoryFillRequestRepository::new();
        let request = FillRequestBuilder::new()
            .with_target_count(10)
            .with_completed_count(8)
            .build();
        repo.create(&request).await.unwrap();

        let total = repo.increment_completed(request.id, 5).await.unwrap();
        assert_eq!(total, 10);
    }
}

//! Room-based event gateway.
//!
//! One broadcast channel per room. Events flow in from the dispatch
//! pipeline through the [`ProgressNotifier`] port and out to whatever
//! sockets joined the room. Two filters sit in front of the channel:
//! a fingerprint dedup (identical consecutive state for an entity is
//! dropped) and a per-room sliding-window rate limit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use formfill_domain::events::{BalanceEvent, ProgressEvent};
use formfill_domain::ports::ProgressNotifier;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::protocol::{CampaignSnapshot, ServerMessage};

/// Time source, injected so tests can steer the rate-limit window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for tests.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Supplies the full room state sent to a socket right after it joins.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    async fn room_snapshot(&self, room: &str) -> Vec<CampaignSnapshot>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Max frames delivered to one room within a single window.
    pub burst_max: u32,
    /// Minimum spacing between frames in one room, 0 disables.
    pub publish_floor_ms: u64,
    /// Dedup cache bound; the sweep clears the cache past this.
    pub dedup_max_entries: usize,
    /// Rate counters idle this long are purged by the sweep.
    pub idle_after_seconds: i64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            burst_max: 10,
            publish_floor_ms: 0,
            dedup_max_entries: 1000,
            idle_after_seconds: 300,
        }
    }
}

struct RoomCounter {
    window_start: DateTime<Utc>,
    count: u32,
    last_activity: DateTime<Utc>,
    last_publish: Option<DateTime<Utc>>,
}

impl RoomCounter {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            count: 0,
            last_activity: now,
            last_publish: None,
        }
    }
}

#[derive(Default)]
struct GatewayState {
    rooms: HashMap<String, broadcast::Sender<ServerMessage>>,
    /// entity key ("{room}:{entity_id}") -> last published fingerprint
    dedup: HashMap<String, String>,
    rate: HashMap<String, RoomCounter>,
}

pub struct RealtimeGateway {
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
    snapshots: Option<Arc<dyn SnapshotProvider>>,
    state: Mutex<GatewayState>,
}

impl RealtimeGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            snapshots: None,
            state: Mutex::new(GatewayState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_snapshot_provider(mut self, provider: Arc<dyn SnapshotProvider>) -> Self {
        self.snapshots = Some(provider);
        self
    }

    /// Subscribe to a room, creating its channel on first join.
    pub fn join(&self, room: &str) -> broadcast::Receiver<ServerMessage> {
        let mut state = self.state.lock().unwrap();
        state
            .rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }

    /// Subscribe and fetch the room's current state in one step.
    pub async fn join_with_snapshot(
        &self,
        room: &str,
    ) -> (broadcast::Receiver<ServerMessage>, Option<ServerMessage>) {
        let receiver = self.join(room);
        let snapshot = match &self.snapshots {
            Some(provider) => {
                let campaigns = provider.room_snapshot(room).await;
                Some(ServerMessage::BulkState {
                    room: room.to_string(),
                    campaigns,
                })
            }
            None => None,
        };
        (receiver, snapshot)
    }

    pub fn room_count(&self) -> usize {
        self.state.lock().unwrap().rooms.len()
    }

    /// Periodic housekeeping: drop channels nobody listens to, purge
    /// idle rate counters, and bound the dedup cache.
    pub fn sweep(&self) {
        let now = self.clock.now();
        let idle_cutoff = now - Duration::seconds(self.config.idle_after_seconds);
        let mut state = self.state.lock().unwrap();

        let rooms_before = state.rooms.len();
        state.rooms.retain(|_, sender| sender.receiver_count() > 0);
        let counters_before = state.rate.len();
        state.rate.retain(|_, counter| counter.last_activity > idle_cutoff);

        let mut dedup_cleared = 0;
        if state.dedup.len() > self.config.dedup_max_entries {
            dedup_cleared = state.dedup.len();
            state.dedup.clear();
        }

        info!(
            rooms_dropped = rooms_before - state.rooms.len(),
            counters_purged = counters_before - state.rate.len(),
            dedup_cleared,
            "realtime sweep finished"
        );
    }

    /// Run one frame through dedup and rate limiting, then broadcast.
    /// Returns whether the frame was delivered to the room channel.
    fn publish(
        &self,
        room_key: &str,
        entity_key: String,
        fingerprint: String,
        message: ServerMessage,
    ) -> bool {
        let now = self.clock.now();
        let mut state = self.state.lock().unwrap();

        if state.dedup.get(&entity_key).map(String::as_str) == Some(fingerprint.as_str()) {
            debug!(room = room_key, "duplicate frame suppressed");
            return false;
        }

        let burst_max = self.config.burst_max;
        let floor_ms = self.config.publish_floor_ms;
        let counter = state
            .rate
            .entry(room_key.to_string())
            .or_insert_with(|| RoomCounter::new(now));
        counter.last_activity = now;
        if now - counter.window_start >= Duration::seconds(1) {
            counter.window_start = now;
            counter.count = 0;
        }
        if counter.count >= burst_max {
            debug!(room = room_key, "room over burst budget, frame dropped");
            return false;
        }
        if floor_ms > 0 {
            if let Some(last) = counter.last_publish {
                if now - last < Duration::milliseconds(floor_ms as i64) {
                    debug!(room = room_key, "frame under publish floor, dropped");
                    return false;
                }
            }
        }
        counter.count += 1;
        counter.last_publish = Some(now);

        state.dedup.insert(entity_key, fingerprint);
        if let Some(sender) = state.rooms.get(room_key) {
            // 没有订阅者时 send 返回 Err，属正常情况
            let _ = sender.send(message);
        }
        true
    }
}

#[async_trait]
impl ProgressNotifier for RealtimeGateway {
    async fn campaign_progress(&self, event: ProgressEvent) {
        for room in event.rooms() {
            let room_key = room.routing_key();
            let entity_key = format!("{room_key}:{}", event.campaign_id);
            let fingerprint = event.fingerprint(&room);
            let message = ServerMessage::progress(room_key.clone(), &event);
            self.publish(&room_key, entity_key, fingerprint, message);
        }
    }

    async fn balance_changed(&self, event: BalanceEvent) {
        let room = event.room();
        let room_key = room.routing_key();
        let entity_key = format!("{room_key}:{}", event.owner_id);
        let fingerprint = event.fingerprint();
        let message = ServerMessage::balance(room_key.clone(), &event);
        self.publish(&room_key, entity_key, fingerprint, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formfill_domain::events::Room;
    use formfill_domain::state::FillRequestStatus;
    use uuid::Uuid;

    fn progress_event(campaign_id: Uuid, completed: u32) -> ProgressEvent {
        ProgressEvent {
            campaign_id,
            form_id: Uuid::nil(),
            user_id: Uuid::nil(),
            status: FillRequestStatus::InProcess,
            completed,
            total: 100,
            updated_at: Utc::now(),
        }
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMessage>) -> usize {
        let mut count = 0;
        while rx.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn test_identical_events_deduplicated() {
        let gateway = RealtimeGateway::new(GatewayConfig::default());
        let event = progress_event(Uuid::new_v4(), 5);
        let room = Room::Form(event.form_id).routing_key();
        let mut rx = gateway.join(&room);

        gateway.campaign_progress(event.clone()).await;
        gateway.campaign_progress(event).await;

        assert_eq!(drain(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_changed_counters_pass_dedup() {
        let gateway = RealtimeGateway::new(GatewayConfig::default());
        let id = Uuid::new_v4();
        let room = Room::Form(Uuid::nil()).routing_key();
        let mut rx = gateway.join(&room);

        gateway.campaign_progress(progress_event(id, 5)).await;
        gateway.campaign_progress(progress_event(id, 6)).await;

        assert_eq!(drain(&mut rx), 2);
    }

    #[tokio::test]
    async fn test_burst_window_caps_delivery() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = RealtimeGateway::new(GatewayConfig {
            burst_max: 10,
            ..GatewayConfig::default()
        })
        .with_clock(clock.clone());
        let room = Room::Form(Uuid::nil()).routing_key();
        let mut rx = gateway.join(&room);

        for i in 0..15 {
            gateway.campaign_progress(progress_event(Uuid::new_v4(), i)).await;
        }
        assert_eq!(drain(&mut rx), 10);

        // 窗口滚动后继续放行
        clock.advance(Duration::milliseconds(1100));
        gateway
            .campaign_progress(progress_event(Uuid::new_v4(), 99))
            .await;
        assert_eq!(drain(&mut rx), 1);
    }

    #[tokio::test]
    async fn test_progress_fans_out_to_both_rooms() {
        let gateway = RealtimeGateway::new(GatewayConfig::default());
        let event = progress_event(Uuid::new_v4(), 1);
        let form_room = Room::Form(event.form_id).routing_key();
        let user_room = Room::UserForm {
            user_id: event.user_id,
            form_id: event.form_id,
        }
        .routing_key();
        let mut form_rx = gateway.join(&form_room);
        let mut user_rx = gateway.join(&user_room);

        gateway.campaign_progress(event).await;

        assert_eq!(drain(&mut form_rx), 1);
        assert_eq!(drain(&mut user_rx), 1);
    }

    #[tokio::test]
    async fn test_sweep_purges_idle_counters_and_empty_rooms() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let gateway = RealtimeGateway::new(GatewayConfig::default()).with_clock(clock.clone());
        let room = Room::Form(Uuid::nil()).routing_key();
        let rx = gateway.join(&room);
        gateway.campaign_progress(progress_event(Uuid::new_v4(), 1)).await;

        drop(rx);
        clock.advance(Duration::seconds(301));
        gateway.sweep();

        assert_eq!(gateway.room_count(), 0);
        let state = gateway.state.lock().unwrap();
        assert!(state.rate.is_empty());
    }

    #[tokio::test]
    async fn test_balance_event_routed_to_owner_room() {
        let gateway = RealtimeGateway::new(GatewayConfig::default());
        let owner = Uuid::new_v4();
        let mut rx = gateway.join(&Room::UserBalance(owner).routing_key());

        gateway
            .balance_changed(BalanceEvent {
                owner_id: owner,
                value_cents: 4200,
                updated_at: Utc::now(),
            })
            .await;

        match rx.try_recv().unwrap() {
            ServerMessage::BalanceUpdate { value_cents, .. } => assert_eq!(value_cents, 4200),
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

//! Realtime progress fan-out.
//!
//! Bridges the dispatch pipeline to websocket subscribers: campaign
//! progress and balance changes are routed into rooms, deduplicated,
//! rate limited per room, and delivered over a broadcast channel per
//! room.

pub mod gateway;
pub mod protocol;
pub mod ws;

pub use gateway::{Clock, GatewayConfig, ManualClock, RealtimeGateway, SnapshotProvider, SystemClock};
pub use protocol::{CampaignSnapshot, ClientMessage, ServerMessage};
pub use ws::{websocket_handler, RealtimeState};

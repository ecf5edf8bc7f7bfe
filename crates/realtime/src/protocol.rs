//! Websocket wire protocol.
//!
//! Clients speak a small JSON protocol: they join and leave rooms by
//! routing key, and the server pushes room-scoped updates. Every server
//! frame carries the room key so a client multiplexing several rooms
//! over one socket can demux without guessing.

use chrono::{DateTime, Utc};
use formfill_domain::events::{BalanceEvent, ProgressEvent};
use formfill_domain::state::FillRequestStatus;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    JoinRoom { room: String },
    LeaveRoom { room: String },
}

/// Frames pushed by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Incremental progress for one campaign.
    ProgressUpdate {
        room: String,
        campaign_id: Uuid,
        form_id: Uuid,
        user_id: Uuid,
        status: FillRequestStatus,
        completed: u32,
        total: u32,
        updated_at: DateTime<Utc>,
    },
    /// Full room state, sent once on join.
    BulkState {
        room: String,
        campaigns: Vec<CampaignSnapshot>,
    },
    /// Account balance change for the room's owner.
    BalanceUpdate {
        room: String,
        owner_id: Uuid,
        value_cents: i64,
        updated_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

/// One campaign's state inside a `BulkState` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CampaignSnapshot {
    pub campaign_id: Uuid,
    pub form_id: Uuid,
    pub status: FillRequestStatus,
    pub completed: u32,
    pub total: u32,
}

impl ServerMessage {
    pub fn progress(room: String, event: &ProgressEvent) -> Self {
        ServerMessage::ProgressUpdate {
            room,
            campaign_id: event.campaign_id,
            form_id: event.form_id,
            user_id: event.user_id,
            status: event.status,
            completed: event.completed,
            total: event.total,
            updated_at: event.updated_at,
        }
    }

    pub fn balance(room: String, event: &BalanceEvent) -> Self {
        ServerMessage::BalanceUpdate {
            room,
            owner_id: event.owner_id,
            value_cents: event.value_cents,
            updated_at: event.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_room","room":"form.abc"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::JoinRoom {
                room: "form.abc".to_string()
            }
        );
    }

    #[test]
    fn test_progress_update_carries_wire_status() {
        let msg = ServerMessage::ProgressUpdate {
            room: "form.x".to_string(),
            campaign_id: Uuid::nil(),
            form_id: Uuid::nil(),
            user_id: Uuid::nil(),
            status: FillRequestStatus::InProcess,
            completed: 3,
            total: 10,
            updated_at: Utc::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"progress_update""#));
        assert!(json.contains(r#""status":"IN_PROCESS""#));
    }

    #[test]
    fn test_bulk_state_round_trip() {
        let msg = ServerMessage::BulkState {
            room: "form.x".to_string(),
            campaigns: vec![CampaignSnapshot {
                campaign_id: Uuid::nil(),
                form_id: Uuid::nil(),
                status: FillRequestStatus::Queued,
                completed: 0,
                total: 5,
            }],
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ServerMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}

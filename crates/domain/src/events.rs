//! 进度事件与订阅房间
//!
//! 实时层按房间做扇出，这里只定义领域侧的事件载荷与路由键

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::FillRequest;
use crate::state::FillRequestStatus;

/// 逻辑订阅通道：表单全局房间、用户+表单房间、用户余额房间
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Room {
    Form(Uuid),
    UserForm { user_id: Uuid, form_id: Uuid },
    UserBalance(Uuid),
}

impl Room {
    /// 扇出层使用的字符串路由键
    pub fn routing_key(&self) -> String {
        match self {
            Room::Form(form_id) => format!("form.{form_id}"),
            Room::UserForm { user_id, form_id } => format!("user.{user_id}.form.{form_id}"),
            Room::UserBalance(user_id) => format!("user.{user_id}.balance"),
        }
    }
}

/// 一条活动进度事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub campaign_id: Uuid,
    pub form_id: Uuid,
    pub user_id: Uuid,
    pub status: FillRequestStatus,
    pub completed: u32,
    pub total: u32,
    pub updated_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn from_request(request: &FillRequest) -> Self {
        Self {
            campaign_id: request.id,
            form_id: request.form_id,
            user_id: request.user_id,
            status: request.status,
            completed: request.completed_count,
            total: request.target_count,
            updated_at: Utc::now(),
        }
    }

    /// 去重指纹：房间 + 实体 + 状态 + 进度计数
    pub fn fingerprint(&self, room: &Room) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            room.routing_key(),
            self.campaign_id,
            self.status,
            self.completed,
            self.total
        )
    }

    /// 进度事件广播到的全部房间
    pub fn rooms(&self) -> [Room; 2] {
        [
            Room::Form(self.form_id),
            Room::UserForm {
                user_id: self.user_id,
                form_id: self.form_id,
            },
        ]
    }
}

/// 余额变动事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceEvent {
    pub owner_id: Uuid,
    pub value_cents: i64,
    pub updated_at: DateTime<Utc>,
}

impl BalanceEvent {
    pub fn room(&self) -> Room {
        Room::UserBalance(self.owner_id)
    }

    pub fn fingerprint(&self) -> String {
        format!(
            "{}:{}:{}",
            self.room().routing_key(),
            self.owner_id,
            self.value_cents
        )
    }
}

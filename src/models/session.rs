// 会话快照描述

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 活动会话信息（只读快照，用于 UI 查询连接状态）
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub config_id: String,
    pub config_name: String,
    pub host: String,
    pub connected_at: DateTime<Utc>,
    pub is_active: bool,
}

// ==========================================
// 纺织生产追溯系统 - 操作日志领域模型
// ==========================================
// 红线: 所有写入必须记录，且与被记录的变更同事务提交
// 用途: 审计追踪、数量流转回溯
// ==========================================

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,
    pub action_type: String,      // ActionType::as_str()
    pub action_ts: NaiveDateTime,
    pub actor: String,

    // ===== 操作对象 =====
    pub target_kind: String,      // ORDER / WARP / LOOM / FABRIC_CUT
    pub target_id: String,
    pub order_id: Option<String>, // 便于按订单回溯数量流转

    // ===== 操作负载 =====
    pub payload_json: Option<JsonValue>,
    pub detail: Option<String>,
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateOrder,
    UpdateOrderStatus,
    CreateWarp,
    CompleteWarp,
    StopWarp,
    ReassignLoom,
    CreateLoom,
    ChangeLoomStatus,
    DeleteLoom,
    CreateFabricCuts,
    SplitFabricCut,
    InspectionArrival,
    RecordInspection,
    UpdateConfig,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateOrder => "CREATE_ORDER",
            ActionType::UpdateOrderStatus => "UPDATE_ORDER_STATUS",
            ActionType::CreateWarp => "CREATE_WARP",
            ActionType::CompleteWarp => "COMPLETE_WARP",
            ActionType::StopWarp => "STOP_WARP",
            ActionType::ReassignLoom => "REASSIGN_LOOM",
            ActionType::CreateLoom => "CREATE_LOOM",
            ActionType::ChangeLoomStatus => "CHANGE_LOOM_STATUS",
            ActionType::DeleteLoom => "DELETE_LOOM",
            ActionType::CreateFabricCuts => "CREATE_FABRIC_CUTS",
            ActionType::SplitFabricCut => "SPLIT_FABRIC_CUT",
            ActionType::InspectionArrival => "INSPECTION_ARRIVAL",
            ActionType::RecordInspection => "RECORD_INSPECTION",
            ActionType::UpdateConfig => "UPDATE_CONFIG",
        }
    }

    /// 操作对象类型
    pub fn target_kind(&self) -> &'static str {
        match self {
            ActionType::CreateOrder | ActionType::UpdateOrderStatus => "ORDER",
            ActionType::CreateWarp
            | ActionType::CompleteWarp
            | ActionType::StopWarp
            | ActionType::ReassignLoom => "WARP",
            ActionType::CreateLoom | ActionType::ChangeLoomStatus | ActionType::DeleteLoom => {
                "LOOM"
            }
            ActionType::CreateFabricCuts => "WARP",
            ActionType::SplitFabricCut
            | ActionType::InspectionArrival
            | ActionType::RecordInspection => "FABRIC_CUT",
            ActionType::UpdateConfig => "CONFIG",
        }
    }
}

impl ActionLog {
    /// 构造一条操作日志（时间取当前 UTC）
    pub fn new(
        action_type: ActionType,
        actor: &str,
        target_id: &str,
        order_id: Option<&str>,
        payload_json: Option<JsonValue>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            action_id: uuid::Uuid::new_v4().to_string(),
            action_type: action_type.as_str().to_string(),
            action_ts: Utc::now().naive_utc(),
            actor: actor.to_string(),
            target_kind: action_type.target_kind().to_string(),
            target_id: target_id.to_string(),
            order_id: order_id.map(str::to_string),
            payload_json,
            detail: Some(detail.into()),
        }
    }
}

// ==========================================
// 纺织生产追溯系统 - 布匹领域模型
// ==========================================
// 布号:   {经轴号}-{匹号:02}            例: W5-03
// 子匹号: {父布号}/{子序号:02}          例: W5-03/01
// 扫码串: {经轴号}/{匹号:02}[/{子序号:02}]
// ==========================================

use crate::domain::loom::LoomSnapshot;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// FabricCut - 布匹
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FabricCut {
    pub fabric_cut_id: String,
    pub warp_id: String,
    pub fabric_number: String,
    pub cut_number: i64,
    pub quantity: f64,

    // ===== 分匹 =====
    pub parent_fabric_id: Option<String>,
    pub sub_cut_number: Option<i64>,

    pub scan_code: String,
    pub loom_snapshot: LoomSnapshot,

    // ===== 验布交接 =====
    pub inspection_arrived_at: Option<NaiveDateTime>, // 到达验布的扫码时间
    pub inspected: bool,                              // 已验布

    pub created_at: NaiveDateTime,
}

impl FabricCut {
    pub fn is_sub_cut(&self) -> bool {
        self.sub_cut_number.is_some()
    }
}

// ==========================================
// InspectionRecord - 验布记录
// ==========================================
// 以布号为键，分匹时随父布匹一并删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecord {
    pub inspection_id: String,
    pub fabric_number: String,
    pub fabric_cut_id: String,
    pub inspector: String,
    pub result: String,
    pub remarks: Option<String>,
    pub inspected_at: NaiveDateTime,
}

// ==========================================
// 纺织生产追溯系统 - 织机领域模型
// ==========================================
// 红线: BUSY ⇔ 恰有一个 ACTIVE 经轴引用该织机
// ==========================================

use crate::domain::types::LoomStatus;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Loom - 织机
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loom {
    pub loom_id: String,
    pub company_name: String, // 所属公司 / 车间
    pub loom_name: String,
    pub status: LoomStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

// ==========================================
// LoomSnapshot - 织机身份快照
// ==========================================
// 创建经轴 / 布匹时写入，织机删除后仍可用于展示
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoomSnapshot {
    pub loom_name: String,
    pub company_name: String,
}

impl From<&Loom> for LoomSnapshot {
    fn from(loom: &Loom) -> Self {
        Self {
            loom_name: loom.loom_name.clone(),
            company_name: loom.company_name.clone(),
        }
    }
}

impl Loom {
    pub fn is_idle(&self) -> bool {
        self.status == LoomStatus::Idle
    }

    /// 显示名: "{公司} / {织机}"
    pub fn display_name(&self) -> String {
        format!("{} / {}", self.company_name, self.loom_name)
    }
}

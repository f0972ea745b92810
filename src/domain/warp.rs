// ==========================================
// 纺织生产追溯系统 - 经轴领域模型
// ==========================================
// 生命周期: ACTIVE → {COMPLETE, STOPPED}
// 分配口径: 停机经轴按原始分配量计，扣除其从释放池领用的部分
// ==========================================

use crate::domain::loom::LoomSnapshot;
use crate::domain::types::WarpStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// Warp - 经轴
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warp {
    pub warp_id: String,
    pub warp_code: String, // W{序号}
    pub order_id: String,
    pub loom_id: String,

    // ===== 数量 (米) =====
    pub quantity: f64,                   // 当前数量（停机后为剩余量）
    pub original_quantity: Option<f64>,  // 停机前的分配量
    pub used_quantity: Option<f64>,      // 停机时已消耗量
    pub freed_drawdown: f64,             // 创建时从释放池领用的量

    pub status: WarpStatus,

    // ===== 日期 =====
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,             // 计划结束
    pub completion_date: Option<NaiveDateTime>,  // 实际离开 ACTIVE 的时间

    // ===== 织机快照 =====
    pub loom_snapshot: LoomSnapshot,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Warp {
    /// 分配基数: 停机经轴计原始分配量，其余计当前数量
    pub fn allocation_basis(&self) -> f64 {
        match self.status {
            WarpStatus::Stopped => self.original_quantity.unwrap_or(self.quantity),
            _ => self.quantity,
        }
    }

    /// 净占用整经量 = 分配基数 − 释放池领用量
    pub fn net_allocated(&self) -> f64 {
        self.allocation_basis() - self.freed_drawdown
    }

    pub fn is_active(&self) -> bool {
        self.status == WarpStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn warp(status: WarpStatus, quantity: f64, original: Option<f64>, drawdown: f64) -> Warp {
        let now = Utc::now().naive_utc();
        Warp {
            warp_id: "w1".to_string(),
            warp_code: "W1".to_string(),
            order_id: "o1".to_string(),
            loom_id: "l1".to_string(),
            quantity,
            original_quantity: original,
            used_quantity: None,
            freed_drawdown: drawdown,
            status,
            start_date: now.date(),
            end_date: None,
            completion_date: None,
            loom_snapshot: LoomSnapshot {
                loom_name: "L-01".to_string(),
                company_name: "Unit A".to_string(),
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_stopped_warp_counts_original_quantity() {
        let w = warp(WarpStatus::Stopped, 100.0, Some(1100.0), 0.0);
        assert_eq!(w.allocation_basis(), 1100.0);
        assert_eq!(w.net_allocated(), 1100.0);
    }

    #[test]
    fn test_drawdown_is_netted_out() {
        let w = warp(WarpStatus::Active, 100.0, None, 100.0);
        assert_eq!(w.allocation_basis(), 100.0);
        assert_eq!(w.net_allocated(), 0.0);
    }
}

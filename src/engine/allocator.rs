// ==========================================
// 纺织生产追溯系统 - 整经量分配引擎
// ==========================================
// 红线: Engine 不拼 SQL，只做计算与判定
// ==========================================
// 可用量 = 整经量 − Σ净占用 + 释放池余额
// 净占用 = (停机 ? 原始分配量 : 当前数量) − 释放池领用量
// 新经轴优先从释放池领用 min(申请量, 余额)
// ==========================================

use crate::domain::order::Order;
use crate::domain::warp::Warp;
use crate::engine::error::{RuleResult, RuleViolation};
use serde::{Deserialize, Serialize};

/// 浮点比较容差
pub const ALLOCATION_EPSILON: f64 = 1e-9;

// ==========================================
// AllocationSummary - 订单分配汇总
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSummary {
    pub order_id: String,
    pub warping_quantity: f64,
    pub allocated_quantity: f64, // Σ净占用
    pub freed_quantity: f64,     // 释放池余额
    pub available_quantity: f64,
    pub warp_count: usize,
    pub active_warp_count: usize,
}

// ==========================================
// AllocationPlan - 单次分配方案
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationPlan {
    pub quantity: f64,
    pub freed_drawdown: f64,
    pub freed_balance_after: f64,
}

/// 计算订单的分配汇总
///
/// `warps` 必须是该订单下的全部经轴（任意状态）
pub fn summarize(order: &Order, warps: &[Warp], freed: f64) -> AllocationSummary {
    let allocated: f64 = warps.iter().map(Warp::net_allocated).sum();
    AllocationSummary {
        order_id: order.order_id.clone(),
        warping_quantity: order.warping_quantity,
        allocated_quantity: allocated,
        freed_quantity: freed,
        available_quantity: order.warping_quantity - allocated + freed,
        warp_count: warps.len(),
        active_warp_count: warps.iter().filter(|w| w.is_active()).count(),
    }
}

/// 判定申请量并生成领用方案
///
/// # 错误
/// - `RuleViolation::Validation`: 申请量非正或非有限数
/// - `RuleViolation::InsufficientQuantity`: 申请量超过可用量
pub fn plan_allocation(summary: &AllocationSummary, quantity: f64) -> RuleResult<AllocationPlan> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(RuleViolation::Validation(format!(
            "经轴数量必须为正数: {}",
            quantity
        )));
    }

    if quantity > summary.available_quantity + ALLOCATION_EPSILON {
        return Err(RuleViolation::InsufficientQuantity {
            order_id: summary.order_id.clone(),
            requested: quantity,
            available: summary.available_quantity.max(0.0),
        });
    }

    let freed_drawdown = quantity.min(summary.freed_quantity.max(0.0));
    Ok(AllocationPlan {
        quantity,
        freed_drawdown,
        freed_balance_after: summary.freed_quantity - freed_drawdown,
    })
}

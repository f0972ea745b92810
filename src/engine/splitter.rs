// ==========================================
// 纺织生产追溯系统 - 分匹
// ==========================================
// 红线: Σ子匹数量 == 父匹数量（容差内），父匹与其验布记录同事务删除
// 子匹继承父匹的织机快照，不继承到达验布标记
// ==========================================

use crate::domain::fabric_cut::FabricCut;
use crate::engine::error::{RuleResult, RuleViolation};
use crate::engine::scan_code;
use chrono::NaiveDateTime;

/// 分匹前校验
///
/// # 错误
/// - `Validation`: 父匹本身是子匹
/// - `QuantityMismatch`: 份数 < 2、存在非正数量、或合计超出容差
pub fn validate_split(parent: &FabricCut, quantities: &[f64], tolerance: f64) -> RuleResult<()> {
    if parent.is_sub_cut() {
        return Err(RuleViolation::Validation(format!(
            "子匹不能再次分匹: {}",
            parent.fabric_number
        )));
    }

    if quantities.len() < 2 {
        return Err(RuleViolation::QuantityMismatch(format!(
            "至少需要分为 2 份, 实际 {} 份",
            quantities.len()
        )));
    }

    if let Some(bad) = quantities.iter().find(|q| !q.is_finite() || **q <= 0.0) {
        return Err(RuleViolation::QuantityMismatch(format!(
            "每份数量必须为正数: {}",
            bad
        )));
    }

    let total: f64 = quantities.iter().sum();
    if (total - parent.quantity).abs() >= tolerance {
        return Err(RuleViolation::QuantityMismatch(format!(
            "合计 {} 与原数量 {} 不一致",
            total, parent.quantity
        )));
    }
    Ok(())
}

/// 构造子匹（子序号从 1 开始）
pub fn build_children(
    parent: &FabricCut,
    warp_code: &str,
    quantities: &[f64],
    now: NaiveDateTime,
) -> Vec<FabricCut> {
    quantities
        .iter()
        .enumerate()
        .map(|(idx, quantity)| {
            let sub = idx as i64 + 1;
            FabricCut {
                fabric_cut_id: uuid::Uuid::new_v4().to_string(),
                warp_id: parent.warp_id.clone(),
                fabric_number: scan_code::sub_fabric_number(&parent.fabric_number, sub),
                cut_number: parent.cut_number,
                quantity: *quantity,
                parent_fabric_id: Some(parent.fabric_cut_id.clone()),
                sub_cut_number: Some(sub),
                scan_code: scan_code::sub_scan_code(warp_code, parent.cut_number, sub),
                loom_snapshot: parent.loom_snapshot.clone(),
                inspection_arrived_at: None,
                inspected: false,
                created_at: now,
            }
        })
        .collect()
}

// ==========================================
// 纺织生产追溯系统 - 织机状态机
// ==========================================
// IDLE ⇄ BUSY        : 经轴创建 / 改派 占用，经轴完成 / 停机 释放
// IDLE ⇄ MAINTENANCE : 仅外部操作
// 红线: BUSY ⇔ 恰有一个 ACTIVE 经轴引用该织机
// ==========================================

use crate::domain::loom::Loom;
use crate::domain::types::{LoomReassignPolicy, LoomStatus};
use crate::engine::error::{RuleResult, RuleViolation};

/// 占用判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupyDecision {
    /// 织机空闲，正常占用
    Granted,
    /// LEGACY 策略下跳过检查强制占用（需告警）
    Forced,
}

/// 经轴占用织机前的检查
///
/// STRICT: 非 IDLE 一律拒绝；LEGACY: 不拒绝，非 IDLE 时返回 Forced
pub fn check_occupy(loom: &Loom, policy: LoomReassignPolicy) -> RuleResult<OccupyDecision> {
    match (loom.status, policy) {
        (LoomStatus::Idle, _) => Ok(OccupyDecision::Granted),
        (_, LoomReassignPolicy::Legacy) => Ok(OccupyDecision::Forced),
        (LoomStatus::Busy, LoomReassignPolicy::Strict) => Err(RuleViolation::LoomBusy {
            loom_id: loom.loom_id.clone(),
        }),
        (LoomStatus::Maintenance, LoomReassignPolicy::Strict) => {
            Err(RuleViolation::LoomUnavailable {
                loom_id: loom.loom_id.clone(),
                status: loom.status.to_db_str().to_string(),
            })
        }
    }
}

/// 经轴离开后织机应处的状态
///
/// `remaining_active` 为释放后仍引用该织机的 ACTIVE 经轴数
pub fn status_after_release(remaining_active: usize) -> LoomStatus {
    if remaining_active > 0 {
        LoomStatus::Busy
    } else {
        LoomStatus::Idle
    }
}

/// 外部状态变更检查（维护 / 恢复空闲）
///
/// # 错误
/// - `LoomBusy`: 织机在产时不允许外部变更
/// - `InvalidStateTransition`: 外部不允许直接置为 BUSY
pub fn check_external_transition(loom: &Loom, target: LoomStatus) -> RuleResult<()> {
    if loom.status == target {
        return Ok(());
    }
    match (loom.status, target) {
        (LoomStatus::Busy, _) => Err(RuleViolation::LoomBusy {
            loom_id: loom.loom_id.clone(),
        }),
        (_, LoomStatus::Busy) => Err(RuleViolation::InvalidStateTransition {
            entity: "Loom".to_string(),
            from: loom.status.to_db_str().to_string(),
            to: target.to_db_str().to_string(),
        }),
        _ => Ok(()),
    }
}

/// 删除前置检查（两项独立判定）
pub fn check_deletable(loom: &Loom, active_warp_count: usize) -> RuleResult<()> {
    if loom.status == LoomStatus::Busy {
        return Err(RuleViolation::LoomBusy {
            loom_id: loom.loom_id.clone(),
        });
    }
    if active_warp_count > 0 {
        return Err(RuleViolation::ActiveWarpsExist {
            loom_id: loom.loom_id.clone(),
            count: active_warp_count,
        });
    }
    Ok(())
}

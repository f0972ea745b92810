// ==========================================
// 纺织生产追溯系统 - 经轴生命周期
// ==========================================
// ACTIVE → COMPLETE : 数量不变
// ACTIVE → STOPPED  : 剩余量 R 归还订单释放池
// 终态不可重新激活；离开 ACTIVE 时记录完成时间并释放织机（由 API 层写库）
// ==========================================

use crate::domain::types::WarpStatus;
use crate::domain::warp::Warp;
use crate::engine::error::{RuleResult, RuleViolation};
use chrono::NaiveDateTime;

/// 状态转换结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExitOutcome {
    /// 状态未变
    Unchanged,
    Completed,
    /// 停机，携带归还释放池的数量
    Stopped { returned_quantity: f64 },
}

impl ExitOutcome {
    pub fn left_active(&self) -> bool {
        !matches!(self, ExitOutcome::Unchanged)
    }
}

/// 校验状态转换
pub fn check_transition(from: WarpStatus, to: WarpStatus) -> RuleResult<()> {
    if from == to {
        return Ok(());
    }
    if from.is_terminal() {
        return Err(RuleViolation::InvalidStateTransition {
            entity: "Warp".to_string(),
            from: from.to_db_str().to_string(),
            to: to.to_db_str().to_string(),
        });
    }
    Ok(())
}

/// 将状态变更应用到经轴
///
/// # 参数
/// - `target`: 目标状态
/// - `remaining`: 停机剩余量，仅 STOPPED 时必填
pub fn apply_status(
    warp: &mut Warp,
    target: WarpStatus,
    remaining: Option<f64>,
    now: NaiveDateTime,
) -> RuleResult<ExitOutcome> {
    check_transition(warp.status, target)?;

    if target != WarpStatus::Stopped && remaining.is_some() {
        return Err(RuleViolation::Validation(
            "剩余量只能在停机时提供".to_string(),
        ));
    }

    if warp.status == target {
        return Ok(ExitOutcome::Unchanged);
    }

    match target {
        WarpStatus::Active => Ok(ExitOutcome::Unchanged),
        WarpStatus::Complete => {
            warp.status = WarpStatus::Complete;
            warp.completion_date = Some(now);
            warp.updated_at = now;
            Ok(ExitOutcome::Completed)
        }
        WarpStatus::Stopped => {
            let remaining = remaining.ok_or_else(|| {
                RuleViolation::Validation("停机必须提供剩余量".to_string())
            })?;
            let original = warp.quantity;
            if !remaining.is_finite() || remaining < 0.0 || remaining > original {
                return Err(RuleViolation::Validation(format!(
                    "剩余量必须在 0 到 {} 之间: {}",
                    original, remaining
                )));
            }

            warp.original_quantity = Some(original);
            warp.used_quantity = Some(original - remaining);
            warp.quantity = remaining;
            warp.status = WarpStatus::Stopped;
            warp.completion_date = Some(now);
            warp.updated_at = now;
            Ok(ExitOutcome::Stopped {
                returned_quantity: remaining,
            })
        }
    }
}

/// 改派前检查：仅在产经轴可以改派
pub fn check_reassign(warp: &Warp, new_loom_id: &str) -> RuleResult<bool> {
    if warp.loom_id == new_loom_id {
        return Ok(false);
    }
    if !warp.is_active() {
        return Err(RuleViolation::InvalidStateTransition {
            entity: "Warp".to_string(),
            from: warp.status.to_db_str().to_string(),
            to: "REASSIGN".to_string(),
        });
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::loom::LoomSnapshot;
    use chrono::Utc;

    fn active_warp(quantity: f64) -> Warp {
        let now = Utc::now().naive_utc();
        Warp {
            warp_id: "w1".to_string(),
            warp_code: "W1".to_string(),
            order_id: "o1".to_string(),
            loom_id: "l1".to_string(),
            quantity,
            original_quantity: None,
            used_quantity: None,
            freed_drawdown: 0.0,
            status: WarpStatus::Active,
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
    fn test_stop_records_used_and_returns_remainder() {
        let mut warp = active_warp(1100.0);
        let now = Utc::now().naive_utc();
        let outcome = apply_status(&mut warp, WarpStatus::Stopped, Some(100.0), now).unwrap();

        assert_eq!(outcome, ExitOutcome::Stopped { returned_quantity: 100.0 });
        assert_eq!(warp.original_quantity, Some(1100.0));
        assert_eq!(warp.used_quantity, Some(1000.0));
        assert_eq!(warp.quantity, 100.0);
        assert_eq!(warp.completion_date, Some(now));
    }

    #[test]
    fn test_stop_remaining_out_of_range() {
        let mut warp = active_warp(500.0);
        let now = Utc::now().naive_utc();
        assert!(apply_status(&mut warp, WarpStatus::Stopped, Some(501.0), now).is_err());
        assert!(apply_status(&mut warp, WarpStatus::Stopped, Some(-1.0), now).is_err());
        assert!(apply_status(&mut warp, WarpStatus::Stopped, None, now).is_err());
        assert!(warp.is_active());
    }

    #[test]
    fn test_complete_keeps_quantity_and_is_terminal() {
        let mut warp = active_warp(800.0);
        let now = Utc::now().naive_utc();
        assert_eq!(
            apply_status(&mut warp, WarpStatus::Complete, None, now).unwrap(),
            ExitOutcome::Completed
        );
        assert_eq!(warp.quantity, 800.0);

        let err = apply_status(&mut warp, WarpStatus::Active, None, now).unwrap_err();
        assert!(matches!(err, RuleViolation::InvalidStateTransition { .. }));
        assert!(check_reassign(&warp, "l2").is_err());
    }

    #[test]
    fn test_reassign_same_loom_is_noop() {
        let warp = active_warp(10.0);
        assert!(!check_reassign(&warp, "l1").unwrap());
        assert!(check_reassign(&warp, "l2").unwrap());
    }
}

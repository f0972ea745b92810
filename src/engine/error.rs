// ==========================================
// 纺织生产追溯系统 - 业务规则违反
// ==========================================
// 引擎只做判定，不写库；违反时返回 RuleViolation
// ==========================================

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleViolation {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("可分配整经量不足: order_id={order_id}, 申请={requested}, 可用={available}")]
    InsufficientQuantity {
        order_id: String,
        requested: f64,
        available: f64,
    },

    #[error("织机忙碌: loom_id={loom_id}")]
    LoomBusy { loom_id: String },

    #[error("织机不可用: loom_id={loom_id}, status={status}")]
    LoomUnavailable { loom_id: String, status: String },

    #[error("织机仍被 {count} 个在产经轴引用: loom_id={loom_id}")]
    ActiveWarpsExist { loom_id: String, count: usize },

    #[error("分匹数量不守恒: {0}")]
    QuantityMismatch(String),

    #[error("布匹已验布: {fabric_number}")]
    AlreadyInspected { fabric_number: String },

    #[error("无效的状态转换: {entity} from={from} to={to}")]
    InvalidStateTransition {
        entity: String,
        from: String,
        to: String,
    },
}

impl RuleViolation {
    /// 稳定错误码（供前端区分）
    pub fn code(&self) -> &'static str {
        match self {
            RuleViolation::Validation(_) => "VALIDATION_ERROR",
            RuleViolation::InsufficientQuantity { .. } => "INSUFFICIENT_QUANTITY",
            RuleViolation::LoomBusy { .. } => "LOOM_BUSY",
            RuleViolation::LoomUnavailable { .. } => "LOOM_UNAVAILABLE",
            RuleViolation::ActiveWarpsExist { .. } => "ACTIVE_WARPS_EXIST",
            RuleViolation::QuantityMismatch(_) => "QUANTITY_MISMATCH",
            RuleViolation::AlreadyInspected { .. } => "ALREADY_INSPECTED",
            RuleViolation::InvalidStateTransition { .. } => "INVALID_STATE_TRANSITION",
        }
    }
}

pub type RuleResult<T> = Result<T, RuleViolation>;

// ==========================================
// 纺织生产追溯系统 - 领域类型定义
// ==========================================
// 职责: 订单 / 经轴 / 织机 状态枚举与数据库字符串映射
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 订单状态 (Order Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,   // 已录入，尚未分配经轴
    Running,   // 已有经轴在产
    Completed, // 外部确认完成
}

impl OrderStatus {
    /// 从数据库字符串解析
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(OrderStatus::Pending),
            "RUNNING" => Some(OrderStatus::Running),
            "COMPLETED" => Some(OrderStatus::Completed),
            _ => None,
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Running => "RUNNING",
            OrderStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 订单类型 (Order Type)
// ==========================================
// 订单编号按 (年份, 类型) 独立计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Sales,   // 销售订单
    JobWork, // 来料加工
    Sample,  // 打样
}

impl OrderType {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "SALES" | "SO" => Some(OrderType::Sales),
            "JOB_WORK" | "JW" => Some(OrderType::JobWork),
            "SAMPLE" | "SM" => Some(OrderType::Sample),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderType::Sales => "SALES",
            OrderType::JobWork => "JOB_WORK",
            OrderType::Sample => "SAMPLE",
        }
    }

    /// 订单编号前缀
    pub fn number_prefix(&self) -> &'static str {
        match self {
            OrderType::Sales => "SO",
            OrderType::JobWork => "JW",
            OrderType::Sample => "SM",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 经轴状态 (Warp Status)
// ==========================================
// ACTIVE → {COMPLETE, STOPPED}，终态不可重新激活
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarpStatus {
    Active,
    Complete,
    Stopped,
}

impl WarpStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Some(WarpStatus::Active),
            "COMPLETE" => Some(WarpStatus::Complete),
            "STOPPED" => Some(WarpStatus::Stopped),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            WarpStatus::Active => "ACTIVE",
            WarpStatus::Complete => "COMPLETE",
            WarpStatus::Stopped => "STOPPED",
        }
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WarpStatus::Active)
    }
}

impl fmt::Display for WarpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 织机状态 (Loom Status)
// ==========================================
// MAINTENANCE 只能由外部操作进入/离开
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoomStatus {
    Idle,
    Busy,
    Maintenance,
}

impl LoomStatus {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "IDLE" => Some(LoomStatus::Idle),
            "BUSY" => Some(LoomStatus::Busy),
            "MAINTENANCE" => Some(LoomStatus::Maintenance),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LoomStatus::Idle => "IDLE",
            LoomStatus::Busy => "BUSY",
            LoomStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl fmt::Display for LoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 织机改派策略 (Loom Reassign Policy)
// ==========================================
// STRICT: 目标织机必须空闲
// LEGACY: 不检查目标织机状态，直接置为 BUSY（仅告警）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoomReassignPolicy {
    Strict,
    Legacy,
}

impl LoomReassignPolicy {
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "STRICT" => Some(LoomReassignPolicy::Strict),
            "LEGACY" => Some(LoomReassignPolicy::Legacy),
            _ => None,
        }
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            LoomReassignPolicy::Strict => "STRICT",
            LoomReassignPolicy::Legacy => "LEGACY",
        }
    }
}

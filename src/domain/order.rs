// ==========================================
// 纺织生产追溯系统 - 订单领域模型
// ==========================================
// 红线: 整经量 (warping_quantity) 必须大于订单量 (order_quantity)
// ==========================================

use crate::domain::types::{OrderStatus, OrderType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Order - 订单
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub order_number: String,  // {前缀}-{年份}-{序号:04}
    pub order_type: OrderType,
    pub party_name: String,    // 客户 / 来料方
    pub quality: Option<String>, // 品种描述

    // ===== 数量 (米) =====
    pub order_quantity: f64,   // 可结算订单量
    pub warping_quantity: f64, // 整经量 (含缩率/损耗缓冲)

    pub status: OrderStatus,
    pub revision: i64,         // 乐观锁版本号
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Order {
    /// 整经缓冲量
    pub fn buffer_quantity(&self) -> f64 {
        self.warping_quantity - self.order_quantity
    }
}

/// 生成订单编号
///
/// 格式: "{前缀}-{年份}-{序号:04}"，例如 SO-2026-0007
pub fn format_order_number(order_type: OrderType, year: i32, seq: i64) -> String {
    format!("{}-{}-{:04}", order_type.number_prefix(), year, seq)
}

/// 订单计数器作用域（按年份 + 类型独立计数）
pub fn order_counter_scope(order_type: OrderType, year: i32) -> String {
    format!("order:{}:{}", year, order_type.to_db_str())
}

// ==========================================
// FreedQuantity - 释放量池
// ==========================================
// 经轴提前停机时归还的整经量；余额为 0 时记录删除
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreedQuantity {
    pub order_id: String,
    pub total_freed_quantity: f64,
    pub updated_at: NaiveDateTime,
}

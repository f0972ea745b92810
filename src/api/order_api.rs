// ==========================================
// 纺织生产追溯系统 - 订单 API
// ==========================================
// 职责: 订单录入、状态变更、分配汇总、订单列表
// 编号: {前缀}-{年份}-{序号:04}，按 (年份, 类型) 原子计数
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{Datelike, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::api::common::{load_settings, not_found, require_positive, require_text, scoped_pipeline};
use crate::api::error::{ApiError, ApiResult};
use crate::config::TraceConfigReader;
use crate::db::with_immediate_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::order::{format_order_number, order_counter_scope, Order};
use crate::domain::types::{OrderStatus, OrderType};
use crate::engine::allocator::{self, AllocationSummary};
use crate::engine::enrichment::{EnrichOptions, EnrichmentPipeline, OrderQuery, OrderView};
use crate::engine::error::RuleViolation;
use crate::perf::PerfGuard;
use crate::repository::{
    ActionLogRepository, FreedQuantityRepository, OrderRepository, SequenceCounterRepository,
    WarpRepository,
};

// ==========================================
// 请求类型
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    pub party_name: String,
    pub quality: Option<String>,
    pub order_quantity: f64,
    pub warping_quantity: f64,
}

// ==========================================
// OrderApi
// ==========================================
pub struct OrderApi {
    conn: Arc<Mutex<Connection>>,
    order_repo: Arc<OrderRepository>,
    warp_repo: Arc<WarpRepository>,
    freed_repo: Arc<FreedQuantityRepository>,
    pipeline: Arc<EnrichmentPipeline>,
    config: Arc<dyn TraceConfigReader>,
}

impl OrderApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        order_repo: Arc<OrderRepository>,
        warp_repo: Arc<WarpRepository>,
        freed_repo: Arc<FreedQuantityRepository>,
        pipeline: Arc<EnrichmentPipeline>,
        config: Arc<dyn TraceConfigReader>,
    ) -> Self {
        Self {
            conn,
            order_repo,
            warp_repo,
            freed_repo,
            pipeline,
            config,
        }
    }

    /// 录入订单
    ///
    /// # 错误
    /// - `ValidationError`: 订单量 ≤ 0，或整经量不大于订单量
    pub fn create_order(&self, request: CreateOrderRequest, actor: &str) -> ApiResult<Order> {
        let party_name = require_text(&request.party_name, "客户名称")?;
        require_positive(request.order_quantity, "订单量")?;
        if !request.warping_quantity.is_finite()
            || request.warping_quantity <= request.order_quantity
        {
            return Err(ApiError::ValidationError(format!(
                "整经量必须大于订单量: 整经量={}, 订单量={}",
                request.warping_quantity, request.order_quantity
            )));
        }

        let order = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Order> {
            let now = Utc::now().naive_utc();
            let scope = order_counter_scope(request.order_type, now.year());
            let seq = SequenceCounterRepository::next_value_tx(tx, &scope)?;

            let order = Order {
                order_id: uuid::Uuid::new_v4().to_string(),
                order_number: format_order_number(request.order_type, now.year(), seq),
                order_type: request.order_type,
                party_name: party_name.clone(),
                quality: request.quality.clone().filter(|q| !q.trim().is_empty()),
                order_quantity: request.order_quantity,
                warping_quantity: request.warping_quantity,
                status: OrderStatus::Pending,
                revision: 0,
                created_at: now,
                updated_at: now,
            };
            OrderRepository::insert_tx(tx, &order)?;

            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::CreateOrder,
                    actor,
                    &order.order_id,
                    Some(&order.order_id),
                    Some(json!({
                        "order_number": order.order_number,
                        "order_quantity": order.order_quantity,
                        "warping_quantity": order.warping_quantity,
                    })),
                    format!("录入订单 {}", order.order_number),
                ),
            )?;
            Ok(order)
        })?;

        info!(
            order_id = %order.order_id,
            order_number = %order.order_number,
            warping_quantity = order.warping_quantity,
            "订单已录入"
        );
        Ok(order)
    }

    pub fn get_order(&self, order_id: &str) -> ApiResult<Order> {
        self.order_repo
            .find_by_id(order_id)?
            .ok_or_else(|| not_found("Order", order_id))
    }

    /// 订单分配汇总（可用量 / 释放池 / 经轴数）
    pub fn allocation_summary(&self, order_id: &str) -> ApiResult<AllocationSummary> {
        let order = self.get_order(order_id)?;
        let warps = self.warp_repo.find_by_order_id(order_id)?;
        let freed = self.freed_repo.balance(order_id)?;
        Ok(allocator::summarize(&order, &warps, freed))
    }

    /// 外部状态变更（仅允许标记为 COMPLETED）
    ///
    /// # 参数
    /// - expected_revision: 调用方持有的版本号；None 时以当前版本为准
    pub fn update_order_status(
        &self,
        order_id: &str,
        target: OrderStatus,
        expected_revision: Option<i64>,
        actor: &str,
    ) -> ApiResult<Order> {
        let order = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Order> {
            let mut order = OrderRepository::find_by_id_tx(tx, order_id)?
                .ok_or_else(|| not_found("Order", order_id))?;

            if order.status == target {
                return Ok(order);
            }
            // RUNNING 只由经轴分配驱动，COMPLETED 为终态
            if target != OrderStatus::Completed || order.status == OrderStatus::Completed {
                return Err(RuleViolation::InvalidStateTransition {
                    entity: "Order".to_string(),
                    from: order.status.to_db_str().to_string(),
                    to: target.to_db_str().to_string(),
                }
                .into());
            }

            let now = Utc::now().naive_utc();
            let revision = expected_revision.unwrap_or(order.revision);
            OrderRepository::update_status_tx(tx, order_id, target, revision, now)?;

            let from = order.status;
            order.status = target;
            order.revision = revision + 1;
            order.updated_at = now;

            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::UpdateOrderStatus,
                    actor,
                    order_id,
                    Some(order_id),
                    Some(json!({ "from": from.to_db_str(), "to": target.to_db_str() })),
                    format!("订单 {} 状态 {} → {}", order.order_number, from, target),
                ),
            )?;
            Ok(order)
        })?;

        info!(order_id = %order.order_id, status = %order.status, "订单状态已更新");
        Ok(order)
    }

    /// 单个订单的关联视图（含分配汇总）
    pub async fn get_order_view(&self, order_id: &str) -> ApiResult<OrderView> {
        let order = self.get_order(order_id)?;
        let settings = load_settings(self.config.as_ref()).await?;
        let mut views = scoped_pipeline(&self.pipeline, &settings)
            .enrich_orders(vec![order], EnrichOptions::default())
            .await?;
        views.pop().ok_or_else(|| not_found("Order", order_id))
    }

    /// 订单列表（附分配汇总，内存过滤）
    pub async fn list_orders(&self, query: &OrderQuery) -> ApiResult<Vec<OrderView>> {
        let _perf = PerfGuard::new("list_orders");
        let settings = load_settings(self.config.as_ref()).await?;

        let orders = match query.status {
            Some(status) => self.order_repo.find_by_status(status)?,
            None => self.order_repo.find_all()?,
        };
        let views = scoped_pipeline(&self.pipeline, &settings)
            .enrich_orders(orders, EnrichOptions::default())
            .await?;
        Ok(query.apply(views))
    }
}

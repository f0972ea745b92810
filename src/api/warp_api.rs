// ==========================================
// 纺织生产追溯系统 - 经轴 API
// ==========================================
// 职责: 经轴分配（整经量扣减）、状态变更、织机改派、经轴列表
// 红线: 读取-判定-写入 在同一个 IMMEDIATE 事务内完成，并以订单 revision 做乐观锁
// ==========================================

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::api::common::{load_settings, not_found, require_positive, require_text, scoped_pipeline};
use crate::api::error::{ApiError, ApiResult};
use crate::config::TraceConfigReader;
use crate::db::with_immediate_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::loom::{Loom, LoomSnapshot};
use crate::domain::types::{LoomReassignPolicy, LoomStatus, OrderStatus, WarpStatus};
use crate::domain::warp::Warp;
use crate::engine::allocator;
use crate::engine::enrichment::{EnrichOptions, EnrichmentPipeline, WarpQuery, WarpView};
use crate::engine::error::RuleViolation;
use crate::engine::loom_state::{self, OccupyDecision};
use crate::engine::warp_lifecycle::{self, ExitOutcome};
use crate::perf::PerfGuard;
use crate::repository::{
    ActionLogRepository, FreedQuantityRepository, LoomRepository, OrderRepository,
    SequenceCounterRepository, WarpRepository,
};

/// 经轴编号计数器作用域（全局递增）
pub const WARP_COUNTER_SCOPE: &str = "warp";

/// 重试退避基数（毫秒）
const RETRY_BACKOFF_MS: u64 = 10;

// ==========================================
// 请求类型
// ==========================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateWarpRequest {
    pub order_id: String,
    pub quantity: f64,
    pub loom_id: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateWarpRequest {
    pub status: Option<WarpStatus>,
    /// 停机剩余量
    pub remaining_quantity: Option<f64>,
    /// 改派目标织机
    pub loom_id: Option<String>,
    pub end_date: Option<NaiveDate>,
}

// ==========================================
// WarpApi
// ==========================================
pub struct WarpApi {
    conn: Arc<Mutex<Connection>>,
    warp_repo: Arc<WarpRepository>,
    pipeline: Arc<EnrichmentPipeline>,
    config: Arc<dyn TraceConfigReader>,
}

impl WarpApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        warp_repo: Arc<WarpRepository>,
        pipeline: Arc<EnrichmentPipeline>,
        config: Arc<dyn TraceConfigReader>,
    ) -> Self {
        Self {
            conn,
            warp_repo,
            pipeline,
            config,
        }
    }

    // ==========================================
    // 经轴分配
    // ==========================================

    /// 为订单分配经轴
    ///
    /// 流程: 可用量判定 → 释放池优先扣减 → 写经轴 → 占用织机 → 订单置 RUNNING
    ///
    /// # 错误
    /// - `InsufficientQuantity`: 申请量超过可用量
    /// - `LoomBusy` / `LoomUnavailable`: STRICT 策略下织机非空闲
    /// - `InvalidStateTransition`: 订单已完成
    pub async fn create_warp(&self, request: CreateWarpRequest, actor: &str) -> ApiResult<Warp> {
        require_positive(request.quantity, "经轴数量")?;
        let loom_id = require_text(&request.loom_id, "织机ID")?;
        if let (Some(start), Some(end)) = (request.start_date, request.end_date) {
            if end < start {
                return Err(ApiError::ValidationError(format!(
                    "结束日期 {} 早于开始日期 {}",
                    end, start
                )));
            }
        }

        let settings = load_settings(self.config.as_ref()).await?;
        let mut attempt: u32 = 0;
        loop {
            match self.allocate_once(&request, &loom_id, settings.loom_reassign_policy, actor) {
                Err(e) if e.is_retryable() && attempt < settings.allocation_max_retries => {
                    attempt += 1;
                    warn!(
                        order_id = %request.order_id,
                        attempt,
                        error = %e,
                        "经轴分配冲突，重试"
                    );
                    tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64))
                        .await;
                }
                Ok(warp) => {
                    info!(
                        warp_id = %warp.warp_id,
                        warp_code = %warp.warp_code,
                        order_id = %warp.order_id,
                        quantity = warp.quantity,
                        freed_drawdown = warp.freed_drawdown,
                        "经轴已分配"
                    );
                    return Ok(warp);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn allocate_once(
        &self,
        request: &CreateWarpRequest,
        loom_id: &str,
        policy: LoomReassignPolicy,
        actor: &str,
    ) -> ApiResult<Warp> {
        with_immediate_transaction(&self.conn, |tx| -> ApiResult<Warp> {
            // 1. 订单与现有分配
            let order = OrderRepository::find_by_id_tx(tx, &request.order_id)?
                .ok_or_else(|| not_found("Order", &request.order_id))?;
            if order.status == OrderStatus::Completed {
                return Err(RuleViolation::InvalidStateTransition {
                    entity: "Order".to_string(),
                    from: order.status.to_db_str().to_string(),
                    to: "ALLOCATE".to_string(),
                }
                .into());
            }
            let warps = WarpRepository::find_by_order_id_tx(tx, &order.order_id)?;
            let freed = FreedQuantityRepository::balance_tx(tx, &order.order_id)?;
            let summary = allocator::summarize(&order, &warps, freed);
            let plan = allocator::plan_allocation(&summary, request.quantity)?;

            // 2. 织机
            let loom = LoomRepository::find_by_id_tx(tx, loom_id)?
                .ok_or_else(|| not_found("Loom", loom_id))?;
            occupy_check(&loom, policy)?;

            // 3. 写入
            let now = Utc::now().naive_utc();
            let seq = SequenceCounterRepository::next_value_tx(tx, WARP_COUNTER_SCOPE)?;
            let warp = Warp {
                warp_id: uuid::Uuid::new_v4().to_string(),
                warp_code: format!("W{}", seq),
                order_id: order.order_id.clone(),
                loom_id: loom.loom_id.clone(),
                quantity: plan.quantity,
                original_quantity: None,
                used_quantity: None,
                freed_drawdown: plan.freed_drawdown,
                status: WarpStatus::Active,
                start_date: request.start_date.unwrap_or_else(|| now.date()),
                end_date: request.end_date,
                completion_date: None,
                loom_snapshot: LoomSnapshot::from(&loom),
                created_at: now,
                updated_at: now,
            };
            WarpRepository::insert_tx(tx, &warp)?;

            if plan.freed_drawdown > 0.0 {
                FreedQuantityRepository::set_balance_tx(
                    tx,
                    &order.order_id,
                    plan.freed_balance_after,
                    now,
                )?;
            }
            LoomRepository::update_status_tx(tx, &loom.loom_id, LoomStatus::Busy, now)?;
            // 已是 RUNNING 时同样递增 revision，用于串行化并发分配
            OrderRepository::update_status_tx(
                tx,
                &order.order_id,
                OrderStatus::Running,
                order.revision,
                now,
            )?;

            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::CreateWarp,
                    actor,
                    &warp.warp_id,
                    Some(&order.order_id),
                    Some(json!({
                        "warp_code": warp.warp_code,
                        "quantity": warp.quantity,
                        "freed_drawdown": warp.freed_drawdown,
                        "available_before": summary.available_quantity,
                        "loom_id": warp.loom_id,
                    })),
                    format!(
                        "订单 {} 分配经轴 {} ({}) 于 {}",
                        order.order_number,
                        warp.warp_code,
                        warp.quantity,
                        loom.display_name()
                    ),
                ),
            )?;
            Ok(warp)
        })
    }

    // ==========================================
    // 经轴更新
    // ==========================================

    /// 更新经轴：状态变更（完成 / 停机）、织机改派、计划结束日期
    ///
    /// 同一请求内不允许既改派又结束经轴
    pub async fn update_warp(
        &self,
        warp_id: &str,
        request: UpdateWarpRequest,
        actor: &str,
    ) -> ApiResult<Warp> {
        let settings = load_settings(self.config.as_ref()).await?;
        let policy = settings.loom_reassign_policy;

        let warp = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Warp> {
            let mut warp = WarpRepository::find_by_id_tx(tx, warp_id)?
                .ok_or_else(|| not_found("Warp", warp_id))?;
            let previous_loom_id = warp.loom_id.clone();
            let now = Utc::now().naive_utc();

            let reassign_to = match request.loom_id.as_deref() {
                Some(target) => warp_lifecycle::check_reassign(&warp, target)?.then_some(target),
                None => None,
            };

            let outcome = match request.status {
                Some(target) => {
                    warp_lifecycle::apply_status(&mut warp, target, request.remaining_quantity, now)?
                }
                None if request.remaining_quantity.is_some() => {
                    return Err(ApiError::ValidationError(
                        "提供剩余量时必须指定 STOPPED 状态".to_string(),
                    ));
                }
                None => ExitOutcome::Unchanged,
            };

            if reassign_to.is_some() && outcome.left_active() {
                return Err(ApiError::ValidationError(
                    "不能在同一次更新中既改派织机又结束经轴".to_string(),
                ));
            }

            if let Some(end_date) = request.end_date {
                if end_date < warp.start_date {
                    return Err(ApiError::ValidationError(format!(
                        "结束日期 {} 早于开始日期 {}",
                        end_date, warp.start_date
                    )));
                }
                warp.end_date = Some(end_date);
                warp.updated_at = now;
            }

            if let Some(target_loom_id) = reassign_to {
                let target = LoomRepository::find_by_id_tx(tx, target_loom_id)?
                    .ok_or_else(|| not_found("Loom", target_loom_id))?;
                occupy_check(&target, policy)?;

                warp.loom_id = target.loom_id.clone();
                warp.loom_snapshot = LoomSnapshot::from(&target);
                warp.updated_at = now;
                WarpRepository::update_tx(tx, &warp)?;

                release_loom_tx(tx, &previous_loom_id, now)?;
                LoomRepository::update_status_tx(tx, &target.loom_id, LoomStatus::Busy, now)?;

                ActionLogRepository::insert_tx(
                    tx,
                    &ActionLog::new(
                        ActionType::ReassignLoom,
                        actor,
                        &warp.warp_id,
                        Some(&warp.order_id),
                        Some(json!({ "from": previous_loom_id, "to": target.loom_id })),
                        format!("经轴 {} 改派至 {}", warp.warp_code, target.display_name()),
                    ),
                )?;
                return Ok(warp);
            }

            WarpRepository::update_tx(tx, &warp)?;

            match outcome {
                ExitOutcome::Unchanged => {}
                ExitOutcome::Completed => {
                    release_loom_tx(tx, &warp.loom_id, now)?;
                    ActionLogRepository::insert_tx(
                        tx,
                        &ActionLog::new(
                            ActionType::CompleteWarp,
                            actor,
                            &warp.warp_id,
                            Some(&warp.order_id),
                            Some(json!({ "quantity": warp.quantity })),
                            format!("经轴 {} 完成", warp.warp_code),
                        ),
                    )?;
                }
                ExitOutcome::Stopped { returned_quantity } => {
                    release_loom_tx(tx, &warp.loom_id, now)?;
                    if returned_quantity > 0.0 {
                        let balance = FreedQuantityRepository::balance_tx(tx, &warp.order_id)?;
                        FreedQuantityRepository::set_balance_tx(
                            tx,
                            &warp.order_id,
                            balance + returned_quantity,
                            now,
                        )?;
                    }
                    ActionLogRepository::insert_tx(
                        tx,
                        &ActionLog::new(
                            ActionType::StopWarp,
                            actor,
                            &warp.warp_id,
                            Some(&warp.order_id),
                            Some(json!({
                                "original_quantity": warp.original_quantity,
                                "used_quantity": warp.used_quantity,
                                "returned_quantity": returned_quantity,
                            })),
                            format!("经轴 {} 停机，归还 {}", warp.warp_code, returned_quantity),
                        ),
                    )?;
                }
            }
            Ok(warp)
        })?;

        info!(warp_id = %warp.warp_id, status = %warp.status, loom_id = %warp.loom_id, "经轴已更新");
        Ok(warp)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_warp(&self, warp_id: &str) -> ApiResult<Warp> {
        self.warp_repo
            .find_by_id(warp_id)?
            .ok_or_else(|| not_found("Warp", warp_id))
    }

    pub async fn get_warp_view(&self, warp_id: &str) -> ApiResult<WarpView> {
        let warp = self.get_warp(warp_id)?;
        let settings = load_settings(self.config.as_ref()).await?;
        let mut views = scoped_pipeline(&self.pipeline, &settings)
            .enrich_warps(vec![warp], EnrichOptions::default())
            .await?;
        views.pop().ok_or_else(|| not_found("Warp", warp_id))
    }

    /// 经轴列表（关联订单 / 织机后内存过滤排序）
    pub async fn list_warps(
        &self,
        query: &WarpQuery,
        mut options: EnrichOptions,
    ) -> ApiResult<Vec<WarpView>> {
        let _perf = PerfGuard::new("list_warps");
        let settings = load_settings(self.config.as_ref()).await?;

        let warps = if let Some(order_id) = query.order_id.as_deref() {
            self.warp_repo.find_by_order_id(order_id)?
        } else if let Some(status) = query.status {
            self.warp_repo.find_by_status(status)?
        } else {
            self.warp_repo.find_all()?
        };

        options.include_order |= query.needs_order();
        let views = scoped_pipeline(&self.pipeline, &settings)
            .enrich_warps(warps, options)
            .await?;
        Ok(query.apply(views))
    }
}

/// 占用检查（LEGACY 强制占用时告警）
fn occupy_check(loom: &Loom, policy: LoomReassignPolicy) -> ApiResult<()> {
    if loom_state::check_occupy(loom, policy)? == OccupyDecision::Forced {
        warn!(
            loom_id = %loom.loom_id,
            status = %loom.status,
            "LEGACY 策略: 跳过织机状态检查，强制占用"
        );
    }
    Ok(())
}

/// 经轴离开后释放织机（维护中或已删除的织机保持不动）
fn release_loom_tx(tx: &Connection, loom_id: &str, now: NaiveDateTime) -> ApiResult<()> {
    let Some(loom) = LoomRepository::find_by_id_tx(tx, loom_id)? else {
        return Ok(());
    };
    if loom.status != LoomStatus::Busy {
        return Ok(());
    }
    let remaining = WarpRepository::find_active_by_loom_tx(tx, loom_id)?.len();
    let next = loom_state::status_after_release(remaining);
    if next != loom.status {
        LoomRepository::update_status_tx(tx, loom_id, next, now)?;
    }
    Ok(())
}

// ==========================================
// 纺织生产追溯系统 - 布匹 API
// ==========================================
// 职责: 裁剪布匹、扫码查询、分匹、验布交接、布匹列表
// 红线: 分匹时 父匹删除 + 验布记录删除 + 子匹写入 在同一事务内
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::api::common::{load_settings, not_found, require_positive, require_text, scoped_pipeline};
use crate::api::error::{ApiError, ApiResult};
use crate::config::{TraceConfigReader, TraceSettings};
use crate::db::with_immediate_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::fabric_cut::{FabricCut, InspectionRecord};
use crate::engine::enrichment::{EnrichOptions, EnrichmentPipeline, FabricCutQuery, FabricCutView};
use crate::engine::error::RuleViolation;
use crate::engine::{scan_code, splitter};
use crate::perf::PerfGuard;
use crate::repository::{
    ActionLogRepository, FabricCutRepository, InspectionRepository, WarpRepository,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordInspectionRequest {
    pub fabric_cut_id: String,
    pub inspector: String,
    pub result: String,
    pub remarks: Option<String>,
}

// ==========================================
// FabricCutApi
// ==========================================
pub struct FabricCutApi {
    conn: Arc<Mutex<Connection>>,
    cut_repo: Arc<FabricCutRepository>,
    inspection_repo: Arc<InspectionRepository>,
    pipeline: Arc<EnrichmentPipeline>,
    config: Arc<dyn TraceConfigReader>,
}

impl FabricCutApi {
    pub fn new(
        conn: Arc<Mutex<Connection>>,
        cut_repo: Arc<FabricCutRepository>,
        inspection_repo: Arc<InspectionRepository>,
        pipeline: Arc<EnrichmentPipeline>,
        config: Arc<dyn TraceConfigReader>,
    ) -> Self {
        Self {
            conn,
            cut_repo,
            inspection_repo,
            pipeline,
            config,
        }
    }

    // ==========================================
    // 裁剪
    // ==========================================

    /// 在在产经轴上裁剪 N 匹布
    ///
    /// 匹号 = 经轴现有最大匹号 + 1 起顺序递增（事务内计算）
    pub fn create_fabric_cuts(
        &self,
        warp_id: &str,
        quantities: &[f64],
        actor: &str,
    ) -> ApiResult<Vec<FabricCut>> {
        if quantities.is_empty() {
            return Err(ApiError::ValidationError("至少需要一匹布".to_string()));
        }
        for quantity in quantities {
            require_positive(*quantity, "布匹数量")?;
        }

        let cuts = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Vec<FabricCut>> {
            let warp = WarpRepository::find_by_id_tx(tx, warp_id)?
                .ok_or_else(|| not_found("Warp", warp_id))?;
            if !warp.is_active() {
                return Err(RuleViolation::InvalidStateTransition {
                    entity: "Warp".to_string(),
                    from: warp.status.to_db_str().to_string(),
                    to: "CUT".to_string(),
                }
                .into());
            }

            let now = Utc::now().naive_utc();
            let start = FabricCutRepository::max_cut_number_tx(tx, warp_id)? + 1;
            let cuts: Vec<FabricCut> = quantities
                .iter()
                .zip(start..)
                .map(|(quantity, cut_number)| FabricCut {
                    fabric_cut_id: uuid::Uuid::new_v4().to_string(),
                    warp_id: warp.warp_id.clone(),
                    fabric_number: scan_code::fabric_number(&warp.warp_code, cut_number),
                    cut_number,
                    quantity: *quantity,
                    parent_fabric_id: None,
                    sub_cut_number: None,
                    scan_code: scan_code::scan_code(&warp.warp_code, cut_number),
                    loom_snapshot: warp.loom_snapshot.clone(),
                    inspection_arrived_at: None,
                    inspected: false,
                    created_at: now,
                })
                .collect();
            FabricCutRepository::insert_batch_tx(tx, &cuts)?;

            let fabric_numbers: Vec<&str> = cuts.iter().map(|c| c.fabric_number.as_str()).collect();
            let total_quantity: f64 = quantities.iter().sum();
            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::CreateFabricCuts,
                    actor,
                    &warp.warp_id,
                    Some(&warp.order_id),
                    Some(json!({
                        "fabric_numbers": fabric_numbers,
                        "total_quantity": total_quantity,
                    })),
                    format!("经轴 {} 裁剪 {} 匹", warp.warp_code, cuts.len()),
                ),
            )?;
            Ok(cuts)
        })?;

        info!(warp_id = %warp_id, count = cuts.len(), "布匹已裁剪");
        Ok(cuts)
    }

    // ==========================================
    // 扫码查询
    // ==========================================

    /// 按扫码内容查询布匹（兼容 -/ 分隔与补零差异）
    ///
    /// # 错误
    /// - `NotFound`: 无匹配布匹
    /// - `AlreadyInspected`: 布匹已验布
    pub async fn lookup_by_scan_code(&self, scanned: &str) -> ApiResult<FabricCutView> {
        let _perf = PerfGuard::new("lookup_by_scan_code");
        let settings = load_settings(self.config.as_ref()).await?;
        let cut = self.resolve_scan(scanned, &settings)?;
        self.enrich_one(cut, &settings).await
    }

    fn resolve_scan(&self, scanned: &str, settings: &TraceSettings) -> ApiResult<FabricCut> {
        let decoded = scan_code::decode(scanned)?;
        let candidates = decoded.candidates();
        debug!(scanned = %scanned, candidates = ?candidates, "扫码候选");

        let cut = self
            .cut_repo
            .find_by_fabric_numbers(&candidates, settings.membership_filter_cap)?
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::NotFound(format!("扫码 {} 无对应布匹", scanned.trim())))?;

        if cut.inspected {
            return Err(RuleViolation::AlreadyInspected {
                fabric_number: cut.fabric_number,
            }
            .into());
        }
        Ok(cut)
    }

    async fn enrich_one(&self, cut: FabricCut, settings: &TraceSettings) -> ApiResult<FabricCutView> {
        let id = cut.fabric_cut_id.clone();
        let mut views = scoped_pipeline(&self.pipeline, settings)
            .enrich_fabric_cuts(vec![cut], EnrichOptions::default())
            .await?;
        views.pop().ok_or_else(|| not_found("FabricCut", &id))
    }

    // ==========================================
    // 分匹
    // ==========================================

    /// 将一匹布拆分为多匹（不幂等：重放时父匹已不存在，返回 NotFound）
    ///
    /// # 错误
    /// - `QuantityMismatch`: 份数 < 2、存在非正数量、或合计超出容差
    /// - `NotFound`: 父匹不存在
    pub async fn split_fabric_cut(
        &self,
        fabric_cut_id: &str,
        quantities: &[f64],
        actor: &str,
    ) -> ApiResult<Vec<FabricCut>> {
        let settings = load_settings(self.config.as_ref()).await?;

        let children = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Vec<FabricCut>> {
            let parent = FabricCutRepository::find_by_id_tx(tx, fabric_cut_id)?
                .ok_or_else(|| not_found("FabricCut", fabric_cut_id))?;
            splitter::validate_split(&parent, quantities, settings.split_quantity_tolerance)?;

            let warp = WarpRepository::find_by_id_tx(tx, &parent.warp_id)?
                .ok_or_else(|| not_found("Warp", &parent.warp_id))?;
            let now = Utc::now().naive_utc();
            let children = splitter::build_children(&parent, &warp.warp_code, quantities, now);

            let removed_inspections =
                InspectionRepository::delete_by_fabric_number_tx(tx, &parent.fabric_number)?;
            FabricCutRepository::delete_tx(tx, &parent.fabric_cut_id)?;
            FabricCutRepository::insert_batch_tx(tx, &children)?;

            let child_summary: Vec<serde_json::Value> = children
                .iter()
                .map(|c| json!({ "fabric_number": c.fabric_number, "quantity": c.quantity }))
                .collect();
            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::SplitFabricCut,
                    actor,
                    &parent.fabric_cut_id,
                    Some(&warp.order_id),
                    Some(json!({
                        "parent_fabric_number": parent.fabric_number,
                        "parent_quantity": parent.quantity,
                        "children": child_summary,
                        "removed_inspections": removed_inspections,
                    })),
                    format!("布匹 {} 分为 {} 匹", parent.fabric_number, children.len()),
                ),
            )?;
            Ok(children)
        })?;

        info!(parent_id = %fabric_cut_id, count = children.len(), "分匹完成");
        Ok(children)
    }

    // ==========================================
    // 验布交接
    // ==========================================

    /// 到达验布扫码：记录首次到达时间
    pub async fn receive_at_inspection(&self, scanned: &str, actor: &str) -> ApiResult<FabricCutView> {
        let settings = load_settings(self.config.as_ref()).await?;
        let cut = self.resolve_scan(scanned, &settings)?;
        let cut = self.stamp_arrival(&cut, scanned, actor)?;

        info!(fabric_number = %cut.fabric_number, "布匹到达验布");
        self.enrich_one(cut, &settings).await
    }

    /// 事务内写入到达时间；扫码解析之后可能已被验布或分匹，需重新读取
    fn stamp_arrival(&self, resolved: &FabricCut, scanned: &str, actor: &str) -> ApiResult<FabricCut> {
        with_immediate_transaction(&self.conn, |tx| -> ApiResult<FabricCut> {
            let cut = FabricCutRepository::find_by_id_tx(tx, &resolved.fabric_cut_id)?
                .ok_or_else(|| not_found("FabricCut", &resolved.fabric_cut_id))?;
            if cut.inspected {
                return Err(RuleViolation::AlreadyInspected {
                    fabric_number: cut.fabric_number,
                }
                .into());
            }

            let now = Utc::now().naive_utc();
            FabricCutRepository::mark_arrival_tx(tx, &cut.fabric_cut_id, now)?;
            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::InspectionArrival,
                    actor,
                    &cut.fabric_cut_id,
                    None,
                    Some(json!({ "scanned": scanned.trim() })),
                    format!("布匹 {} 到达验布", cut.fabric_number),
                ),
            )?;
            FabricCutRepository::find_by_id_tx(tx, &cut.fabric_cut_id)?
                .ok_or_else(|| not_found("FabricCut", &cut.fabric_cut_id))
        })
    }

    /// 写验布记录并标记已验布
    pub fn record_inspection(
        &self,
        request: RecordInspectionRequest,
        actor: &str,
    ) -> ApiResult<InspectionRecord> {
        let inspector = require_text(&request.inspector, "验布员")?;
        let result = require_text(&request.result, "验布结果")?;

        let record = with_immediate_transaction(&self.conn, |tx| -> ApiResult<InspectionRecord> {
            let cut = FabricCutRepository::find_by_id_tx(tx, &request.fabric_cut_id)?
                .ok_or_else(|| not_found("FabricCut", &request.fabric_cut_id))?;
            if cut.inspected {
                return Err(RuleViolation::AlreadyInspected {
                    fabric_number: cut.fabric_number,
                }
                .into());
            }

            let record = InspectionRecord {
                inspection_id: uuid::Uuid::new_v4().to_string(),
                fabric_number: cut.fabric_number.clone(),
                fabric_cut_id: cut.fabric_cut_id.clone(),
                inspector: inspector.clone(),
                result: result.clone(),
                remarks: request.remarks.clone(),
                inspected_at: Utc::now().naive_utc(),
            };
            InspectionRepository::insert_tx(tx, &record)?;
            FabricCutRepository::mark_inspected_tx(tx, &cut.fabric_cut_id)?;

            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::RecordInspection,
                    actor,
                    &cut.fabric_cut_id,
                    None,
                    Some(json!({ "inspector": inspector, "result": result })),
                    format!("布匹 {} 验布: {}", cut.fabric_number, result),
                ),
            )?;
            Ok(record)
        })?;

        info!(fabric_number = %record.fabric_number, result = %record.result, "验布已记录");
        Ok(record)
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn get_fabric_cut(&self, fabric_cut_id: &str) -> ApiResult<FabricCut> {
        self.cut_repo
            .find_by_id(fabric_cut_id)?
            .ok_or_else(|| not_found("FabricCut", fabric_cut_id))
    }

    pub fn list_inspections(&self, fabric_number: &str) -> ApiResult<Vec<InspectionRecord>> {
        Ok(self.inspection_repo.find_by_fabric_number(fabric_number)?)
    }

    /// 布匹列表（两级关联后内存过滤排序）
    pub async fn list_fabric_cuts(&self, query: &FabricCutQuery) -> ApiResult<Vec<FabricCutView>> {
        let _perf = PerfGuard::new("list_fabric_cuts");
        let settings = load_settings(self.config.as_ref()).await?;

        let cuts = match query.warp_id.as_deref() {
            Some(warp_id) => self.cut_repo.find_by_warp_id(warp_id)?,
            None => self.cut_repo.find_all()?,
        };
        let views = scoped_pipeline(&self.pipeline, &settings)
            .enrich_fabric_cuts(cuts, EnrichOptions::default())
            .await?;
        Ok(query.apply(views))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{CreateLoomRequest, CreateOrderRequest, CreateWarpRequest};
    use crate::app::AppState;
    use crate::domain::types::OrderType;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_arrival_rechecks_inspection_inside_transaction() {
        let tmp = NamedTempFile::new().unwrap();
        let state = AppState::new(tmp.path().to_string_lossy().to_string()).unwrap();
        let order = state
            .order_api
            .create_order(
                CreateOrderRequest {
                    order_type: OrderType::Sales,
                    party_name: "Acme Textiles".to_string(),
                    quality: None,
                    order_quantity: 1000.0,
                    warping_quantity: 1100.0,
                },
                "tester",
            )
            .unwrap();
        let loom = state
            .loom_api
            .create_loom(
                CreateLoomRequest {
                    company_name: "Unit A".to_string(),
                    loom_name: "L-01".to_string(),
                },
                "tester",
            )
            .unwrap();
        let warp = state
            .warp_api
            .create_warp(
                CreateWarpRequest {
                    order_id: order.order_id.clone(),
                    quantity: 300.0,
                    loom_id: loom.loom_id.clone(),
                    start_date: None,
                    end_date: None,
                },
                "tester",
            )
            .await
            .unwrap();
        let api = &state.fabric_cut_api;
        let cut = api
            .create_fabric_cuts(&warp.warp_id, &[25.0], "tester")
            .unwrap()
            .remove(0);

        // 扫码已解析出 cut，提交到达前另一台终端完成验布
        api.record_inspection(
            RecordInspectionRequest {
                fabric_cut_id: cut.fabric_cut_id.clone(),
                inspector: "Meena".to_string(),
                result: "A".to_string(),
                remarks: None,
            },
            "tester",
        )
        .unwrap();

        let err = api.stamp_arrival(&cut, "W1/01", "tester").unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rule(RuleViolation::AlreadyInspected { .. })
        ));
        assert!(api
            .get_fabric_cut(&cut.fabric_cut_id)
            .unwrap()
            .inspection_arrived_at
            .is_none());

        // 解析后父匹被分匹删除
        let other = api
            .create_fabric_cuts(&warp.warp_id, &[20.0], "tester")
            .unwrap()
            .remove(0);
        api.split_fabric_cut(&other.fabric_cut_id, &[10.0, 10.0], "tester")
            .await
            .unwrap();
        let err = api.stamp_arrival(&other, "W1/02", "tester").unwrap_err();
        assert_eq!(err.http_status(), 404);
    }
}

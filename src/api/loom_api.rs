// ==========================================
// 纺织生产追溯系统 - 织机 API
// ==========================================
// 职责: 织机登记、维护状态切换、删除（双重守卫）、名册 CSV 导入
// ==========================================

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use crate::api::common::{not_found, require_text};
use crate::api::error::{ApiError, ApiResult};
use crate::db::with_immediate_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::loom::Loom;
use crate::domain::types::LoomStatus;
use crate::engine::loom_state;
use crate::importer::{map_rows, CsvParser, RowIssue};
use crate::repository::{ActionLogRepository, LoomRepository, WarpRepository};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLoomRequest {
    pub company_name: String,
    pub loom_name: String,
}

/// 名册导入结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoomImportReport {
    pub total_rows: usize,
    pub imported: usize,
    /// 已存在（公司+织机名）而跳过的行号
    pub skipped_rows: Vec<usize>,
    pub issues: Vec<RowIssue>,
}

// ==========================================
// LoomApi
// ==========================================
pub struct LoomApi {
    conn: Arc<Mutex<Connection>>,
    loom_repo: Arc<LoomRepository>,
}

impl LoomApi {
    pub fn new(conn: Arc<Mutex<Connection>>, loom_repo: Arc<LoomRepository>) -> Self {
        Self { conn, loom_repo }
    }

    /// 登记织机（公司 + 织机名唯一）
    pub fn create_loom(&self, request: CreateLoomRequest, actor: &str) -> ApiResult<Loom> {
        let company_name = require_text(&request.company_name, "公司名")?;
        let loom_name = require_text(&request.loom_name, "织机名")?;

        let loom = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Loom> {
            if LoomRepository::find_by_name_tx(tx, &company_name, &loom_name)?.is_some() {
                return Err(ApiError::ValidationError(format!(
                    "织机已存在: {} / {}",
                    company_name, loom_name
                )));
            }
            let loom = new_loom(&company_name, &loom_name, LoomStatus::Idle);
            insert_with_log(tx, &loom, actor, "登记织机")?;
            Ok(loom)
        })?;

        info!(loom_id = %loom.loom_id, loom = %loom.display_name(), "织机已登记");
        Ok(loom)
    }

    /// 外部状态切换（IDLE ⇄ MAINTENANCE）
    ///
    /// # 错误
    /// - `LoomBusy`: 织机在产
    /// - `InvalidStateTransition`: 目标为 BUSY
    pub fn set_loom_status(&self, loom_id: &str, target: LoomStatus, actor: &str) -> ApiResult<Loom> {
        let loom = with_immediate_transaction(&self.conn, |tx| -> ApiResult<Loom> {
            let mut loom = LoomRepository::find_by_id_tx(tx, loom_id)?
                .ok_or_else(|| not_found("Loom", loom_id))?;
            loom_state::check_external_transition(&loom, target)?;
            if loom.status == target {
                return Ok(loom);
            }

            let now = Utc::now().naive_utc();
            LoomRepository::update_status_tx(tx, loom_id, target, now)?;
            let from = loom.status;
            loom.status = target;
            loom.updated_at = now;

            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::ChangeLoomStatus,
                    actor,
                    loom_id,
                    None,
                    Some(json!({ "from": from.to_db_str(), "to": target.to_db_str() })),
                    format!("织机 {} 状态 {} → {}", loom.display_name(), from, target),
                ),
            )?;
            Ok(loom)
        })?;

        info!(loom_id = %loom.loom_id, status = %loom.status, "织机状态已变更");
        Ok(loom)
    }

    /// 删除织机
    ///
    /// # 错误
    /// - `LoomBusy`: 状态为 BUSY
    /// - `ActiveWarpsExist`: 仍有 ACTIVE 经轴引用（与状态独立判定）
    pub fn delete_loom(&self, loom_id: &str, actor: &str) -> ApiResult<()> {
        with_immediate_transaction(&self.conn, |tx| -> ApiResult<()> {
            let loom = LoomRepository::find_by_id_tx(tx, loom_id)?
                .ok_or_else(|| not_found("Loom", loom_id))?;
            let active = WarpRepository::find_active_by_loom_tx(tx, loom_id)?.len();
            loom_state::check_deletable(&loom, active)?;

            LoomRepository::delete_tx(tx, loom_id)?;
            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::DeleteLoom,
                    actor,
                    loom_id,
                    None,
                    Some(json!({
                        "company_name": loom.company_name,
                        "loom_name": loom.loom_name,
                    })),
                    format!("删除织机 {}", loom.display_name()),
                ),
            )?;
            Ok(())
        })?;

        info!(loom_id = %loom_id, "织机已删除");
        Ok(())
    }

    pub fn get_loom(&self, loom_id: &str) -> ApiResult<Loom> {
        self.loom_repo
            .find_by_id(loom_id)?
            .ok_or_else(|| not_found("Loom", loom_id))
    }

    pub fn list_looms(&self, status: Option<LoomStatus>) -> ApiResult<Vec<Loom>> {
        let looms = match status {
            Some(status) => self.loom_repo.find_by_status(status)?,
            None => self.loom_repo.find_all()?,
        };
        Ok(looms)
    }

    /// 从 CSV 导入织机名册
    ///
    /// 有效行在同一事务内写入；已存在的织机跳过，格式问题按行汇报
    pub fn import_looms_csv(&self, path: &Path, actor: &str) -> ApiResult<LoomImportReport> {
        let rows = CsvParser::parse_file(path)?;
        let (valid, issues) = map_rows(&rows);

        let mut report = LoomImportReport {
            total_rows: rows.len(),
            issues,
            ..Default::default()
        };

        with_immediate_transaction(&self.conn, |tx| -> ApiResult<()> {
            for row in &valid {
                if LoomRepository::find_by_name_tx(tx, &row.company_name, &row.loom_name)?.is_some()
                {
                    report.skipped_rows.push(row.row);
                    continue;
                }
                let loom = new_loom(&row.company_name, &row.loom_name, row.status);
                insert_with_log(tx, &loom, actor, "名册导入")?;
                report.imported += 1;
            }
            Ok(())
        })?;

        if !report.issues.is_empty() {
            warn!(
                path = %path.display(),
                issue_count = report.issues.len(),
                "织机名册存在无效行"
            );
        }
        info!(
            path = %path.display(),
            total = report.total_rows,
            imported = report.imported,
            skipped = report.skipped_rows.len(),
            "织机名册导入完成"
        );
        Ok(report)
    }
}

fn new_loom(company_name: &str, loom_name: &str, status: LoomStatus) -> Loom {
    let now = Utc::now().naive_utc();
    Loom {
        loom_id: uuid::Uuid::new_v4().to_string(),
        company_name: company_name.to_string(),
        loom_name: loom_name.to_string(),
        status,
        created_at: now,
        updated_at: now,
    }
}

fn insert_with_log(tx: &Connection, loom: &Loom, actor: &str, source: &str) -> ApiResult<()> {
    LoomRepository::insert_tx(tx, loom)?;
    ActionLogRepository::insert_tx(
        tx,
        &ActionLog::new(
            ActionType::CreateLoom,
            actor,
            &loom.loom_id,
            None,
            Some(json!({ "status": loom.status.to_db_str(), "source": source })),
            format!("{}: {}", source, loom.display_name()),
        ),
    )?;
    Ok(())
}

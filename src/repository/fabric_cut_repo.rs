// ==========================================
// 纺织生产追溯系统 - 布匹数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 成员过滤 (IN) 的候选数受 store.membership_filter_cap 限制
// ==========================================

use crate::domain::fabric_cut::FabricCut;
use crate::domain::loom::LoomSnapshot;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const FABRIC_CUT_COLUMNS: &str = "fabric_cut_id, warp_id, fabric_number, cut_number, quantity, \
     parent_fabric_id, sub_cut_number, scan_code, loom_name_snapshot, company_name_snapshot, \
     inspection_arrived_at, inspected, created_at";

// ==========================================
// FabricCutRepository - 布匹仓储
// ==========================================
pub struct FabricCutRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FabricCutRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<FabricCut> {
        let inspected: i64 = row.get(11)?;
        Ok(FabricCut {
            fabric_cut_id: row.get(0)?,
            warp_id: row.get(1)?,
            fabric_number: row.get(2)?,
            cut_number: row.get(3)?,
            quantity: row.get(4)?,
            parent_fabric_id: row.get(5)?,
            sub_cut_number: row.get(6)?,
            scan_code: row.get(7)?,
            loom_snapshot: LoomSnapshot {
                loom_name: row.get(8)?,
                company_name: row.get(9)?,
            },
            inspection_arrived_at: row.get(10)?,
            inspected: inspected != 0,
            created_at: row.get(12)?,
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    /// 批量插入（调用方保证处于同一事务）
    pub fn insert_batch_tx(conn: &Connection, cuts: &[FabricCut]) -> RepositoryResult<usize> {
        let mut stmt = conn.prepare(
            r#"INSERT INTO fabric_cuts (
                fabric_cut_id, warp_id, fabric_number, cut_number, quantity,
                parent_fabric_id, sub_cut_number, scan_code, loom_name_snapshot,
                company_name_snapshot, inspection_arrived_at, inspected, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"#,
        )?;

        for cut in cuts {
            stmt.execute(params![
                cut.fabric_cut_id,
                cut.warp_id,
                cut.fabric_number,
                cut.cut_number,
                cut.quantity,
                cut.parent_fabric_id,
                cut.sub_cut_number,
                cut.scan_code,
                cut.loom_snapshot.loom_name,
                cut.loom_snapshot.company_name,
                cut.inspection_arrived_at,
                cut.inspected as i64,
                cut.created_at,
            ])?;
        }
        Ok(cuts.len())
    }

    pub fn find_by_id_tx(conn: &Connection, fabric_cut_id: &str) -> RepositoryResult<Option<FabricCut>> {
        let sql = format!(
            "SELECT {} FROM fabric_cuts WHERE fabric_cut_id = ?1",
            FABRIC_CUT_COLUMNS
        );
        let cut = conn
            .query_row(&sql, params![fabric_cut_id], Self::map_row)
            .optional()?;
        Ok(cut)
    }

    /// 经轴下现有的最大匹号（无布匹时为 0）
    pub fn max_cut_number_tx(conn: &Connection, warp_id: &str) -> RepositoryResult<i64> {
        let max: Option<i64> = conn.query_row(
            "SELECT MAX(cut_number) FROM fabric_cuts WHERE warp_id = ?1",
            params![warp_id],
            |row| row.get(0),
        )?;
        Ok(max.unwrap_or(0))
    }

    /// 按布号成员过滤
    ///
    /// # 错误
    /// - `RepositoryError::MembershipFilterTooLarge`: 候选数超过 cap
    pub fn find_by_fabric_numbers_tx(
        conn: &Connection,
        fabric_numbers: &[String],
        cap: usize,
    ) -> RepositoryResult<Vec<FabricCut>> {
        if fabric_numbers.is_empty() {
            return Ok(Vec::new());
        }
        if fabric_numbers.len() > cap {
            return Err(RepositoryError::MembershipFilterTooLarge {
                len: fabric_numbers.len(),
                cap,
            });
        }

        let placeholders = vec!["?"; fabric_numbers.len()].join(", ");
        let sql = format!(
            "SELECT {} FROM fabric_cuts WHERE fabric_number IN ({}) ORDER BY created_at ASC",
            FABRIC_CUT_COLUMNS, placeholders
        );
        let mut stmt = conn.prepare(&sql)?;
        let cuts = stmt
            .query_map(params_from_iter(fabric_numbers.iter()), Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cuts)
    }

    pub fn find_by_warp_id_tx(conn: &Connection, warp_id: &str) -> RepositoryResult<Vec<FabricCut>> {
        let sql = format!(
            "SELECT {} FROM fabric_cuts WHERE warp_id = ?1 \
             ORDER BY cut_number ASC, sub_cut_number ASC",
            FABRIC_CUT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let cuts = stmt
            .query_map(params![warp_id], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cuts)
    }

    pub fn delete_tx(conn: &Connection, fabric_cut_id: &str) -> RepositoryResult<()> {
        let rows = conn.execute(
            "DELETE FROM fabric_cuts WHERE fabric_cut_id = ?1",
            params![fabric_cut_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("FabricCut", fabric_cut_id));
        }
        Ok(())
    }

    /// 记录到达验布时间（只写首次）
    pub fn mark_arrival_tx(
        conn: &Connection,
        fabric_cut_id: &str,
        arrived_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE fabric_cuts
               SET inspection_arrived_at = COALESCE(inspection_arrived_at, ?1)
               WHERE fabric_cut_id = ?2"#,
            params![arrived_at, fabric_cut_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("FabricCut", fabric_cut_id));
        }
        Ok(())
    }

    pub fn mark_inspected_tx(conn: &Connection, fabric_cut_id: &str) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE fabric_cuts SET inspected = 1 WHERE fabric_cut_id = ?1",
            params![fabric_cut_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("FabricCut", fabric_cut_id));
        }
        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, fabric_cut_id: &str) -> RepositoryResult<Option<FabricCut>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, fabric_cut_id)
    }

    pub fn find_by_warp_id(&self, warp_id: &str) -> RepositoryResult<Vec<FabricCut>> {
        let conn = self.get_conn()?;
        Self::find_by_warp_id_tx(&conn, warp_id)
    }

    pub fn find_by_fabric_numbers(
        &self,
        fabric_numbers: &[String],
        cap: usize,
    ) -> RepositoryResult<Vec<FabricCut>> {
        let conn = self.get_conn()?;
        Self::find_by_fabric_numbers_tx(&conn, fabric_numbers, cap)
    }

    /// 全量扫描（按创建时间倒序）
    pub fn find_all(&self) -> RepositoryResult<Vec<FabricCut>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM fabric_cuts ORDER BY created_at DESC",
            FABRIC_CUT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let cuts = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cuts)
    }
}

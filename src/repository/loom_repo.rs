// ==========================================
// 纺织生产追溯系统 - 织机数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑（删除前置检查在 API 层完成）
// ==========================================

use crate::db::invalid_column;
use crate::domain::loom::Loom;
use crate::domain::types::LoomStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::reader::PointReader;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const LOOM_COLUMNS: &str = "loom_id, company_name, loom_name, status, created_at, updated_at";

// ==========================================
// LoomRepository - 织机仓储
// ==========================================
pub struct LoomRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LoomRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<Loom> {
        let status: String = row.get(3)?;
        Ok(Loom {
            loom_id: row.get(0)?,
            company_name: row.get(1)?,
            loom_name: row.get(2)?,
            status: LoomStatus::from_db_str(&status)
                .ok_or_else(|| invalid_column(3, &status, "织机状态"))?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }

    pub fn insert_tx(conn: &Connection, loom: &Loom) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO looms (loom_id, company_name, loom_name, status, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
            params![
                loom.loom_id,
                loom.company_name,
                loom.loom_name,
                loom.status.to_db_str(),
                loom.created_at,
                loom.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, loom_id: &str) -> RepositoryResult<Option<Loom>> {
        let sql = format!("SELECT {} FROM looms WHERE loom_id = ?1", LOOM_COLUMNS);
        let loom = conn
            .query_row(&sql, params![loom_id], Self::map_row)
            .optional()?;
        Ok(loom)
    }

    pub fn update_status_tx(
        conn: &Connection,
        loom_id: &str,
        status: LoomStatus,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE looms SET status = ?1, updated_at = ?2 WHERE loom_id = ?3",
            params![status.to_db_str(), updated_at, loom_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Loom", loom_id));
        }
        Ok(())
    }

    pub fn delete_tx(conn: &Connection, loom_id: &str) -> RepositoryResult<()> {
        let rows = conn.execute("DELETE FROM looms WHERE loom_id = ?1", params![loom_id])?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Loom", loom_id));
        }
        Ok(())
    }

    pub fn find_by_name_tx(
        conn: &Connection,
        company_name: &str,
        loom_name: &str,
    ) -> RepositoryResult<Option<Loom>> {
        let sql = format!(
            "SELECT {} FROM looms WHERE company_name = ?1 AND loom_name = ?2",
            LOOM_COLUMNS
        );
        let loom = conn
            .query_row(&sql, params![company_name, loom_name], Self::map_row)
            .optional()?;
        Ok(loom)
    }

    pub fn find_by_id(&self, loom_id: &str) -> RepositoryResult<Option<Loom>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, loom_id)
    }

    pub fn find_by_name(&self, company_name: &str, loom_name: &str) -> RepositoryResult<Option<Loom>> {
        let conn = self.get_conn()?;
        Self::find_by_name_tx(&conn, company_name, loom_name)
    }

    /// 全量扫描（按公司、织机名排序）
    pub fn find_all(&self) -> RepositoryResult<Vec<Loom>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM looms ORDER BY company_name ASC, loom_name ASC",
            LOOM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let looms = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(looms)
    }

    pub fn find_by_status(&self, status: LoomStatus) -> RepositoryResult<Vec<Loom>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM looms WHERE status = ?1 ORDER BY company_name ASC, loom_name ASC",
            LOOM_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let looms = stmt
            .query_map(params![status.to_db_str()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(looms)
    }
}

#[async_trait]
impl PointReader<Loom> for LoomRepository {
    async fn read_point(&self, id: &str) -> RepositoryResult<Option<Loom>> {
        self.find_by_id(id)
    }
}

// ==========================================
// 纺织生产追溯系统 - 经轴数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 索引: order_id / (loom_id, status) / status
// ==========================================

use crate::db::invalid_column;
use crate::domain::loom::LoomSnapshot;
use crate::domain::types::WarpStatus;
use crate::domain::warp::Warp;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::reader::{ChildReader, PointReader};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const WARP_COLUMNS: &str = "warp_id, warp_code, order_id, loom_id, quantity, original_quantity, \
     used_quantity, freed_drawdown, status, start_date, end_date, completion_date, \
     loom_name_snapshot, company_name_snapshot, created_at, updated_at";

// ==========================================
// WarpRepository - 经轴仓储
// ==========================================
pub struct WarpRepository {
    conn: Arc<Mutex<Connection>>,
}

impl WarpRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<Warp> {
        let status: String = row.get(8)?;
        Ok(Warp {
            warp_id: row.get(0)?,
            warp_code: row.get(1)?,
            order_id: row.get(2)?,
            loom_id: row.get(3)?,
            quantity: row.get(4)?,
            original_quantity: row.get(5)?,
            used_quantity: row.get(6)?,
            freed_drawdown: row.get(7)?,
            status: WarpStatus::from_db_str(&status)
                .ok_or_else(|| invalid_column(8, &status, "经轴状态"))?,
            start_date: row.get(9)?,
            end_date: row.get(10)?,
            completion_date: row.get(11)?,
            loom_snapshot: LoomSnapshot {
                loom_name: row.get(12)?,
                company_name: row.get(13)?,
            },
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn query_list(
        conn: &Connection,
        where_clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> RepositoryResult<Vec<Warp>> {
        let sql = format!(
            "SELECT {} FROM warps {} ORDER BY created_at DESC",
            WARP_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let warps = stmt
            .query_map(params, Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(warps)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, warp: &Warp) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO warps (
                warp_id, warp_code, order_id, loom_id, quantity, original_quantity,
                used_quantity, freed_drawdown, status, start_date, end_date, completion_date,
                loom_name_snapshot, company_name_snapshot, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"#,
            params![
                warp.warp_id,
                warp.warp_code,
                warp.order_id,
                warp.loom_id,
                warp.quantity,
                warp.original_quantity,
                warp.used_quantity,
                warp.freed_drawdown,
                warp.status.to_db_str(),
                warp.start_date,
                warp.end_date,
                warp.completion_date,
                warp.loom_snapshot.loom_name,
                warp.loom_snapshot.company_name,
                warp.created_at,
                warp.updated_at,
            ],
        )?;
        Ok(())
    }

    /// 整行更新（订单归属与经轴号不可变）
    pub fn update_tx(conn: &Connection, warp: &Warp) -> RepositoryResult<()> {
        let rows = conn.execute(
            r#"UPDATE warps SET
                loom_id = ?1, quantity = ?2, original_quantity = ?3, used_quantity = ?4,
                status = ?5, end_date = ?6, completion_date = ?7,
                loom_name_snapshot = ?8, company_name_snapshot = ?9, updated_at = ?10
               WHERE warp_id = ?11"#,
            params![
                warp.loom_id,
                warp.quantity,
                warp.original_quantity,
                warp.used_quantity,
                warp.status.to_db_str(),
                warp.end_date,
                warp.completion_date,
                warp.loom_snapshot.loom_name,
                warp.loom_snapshot.company_name,
                warp.updated_at,
                warp.warp_id,
            ],
        )?;
        if rows == 0 {
            return Err(RepositoryError::not_found("Warp", &warp.warp_id));
        }
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, warp_id: &str) -> RepositoryResult<Option<Warp>> {
        let sql = format!("SELECT {} FROM warps WHERE warp_id = ?1", WARP_COLUMNS);
        let warp = conn
            .query_row(&sql, params![warp_id], Self::map_row)
            .optional()?;
        Ok(warp)
    }

    pub fn find_by_order_id_tx(conn: &Connection, order_id: &str) -> RepositoryResult<Vec<Warp>> {
        Self::query_list(conn, "WHERE order_id = ?1", &[&order_id])
    }

    /// 引用该织机的 ACTIVE 经轴
    pub fn find_active_by_loom_tx(conn: &Connection, loom_id: &str) -> RepositoryResult<Vec<Warp>> {
        Self::query_list(
            conn,
            "WHERE loom_id = ?1 AND status = ?2",
            &[&loom_id, &WarpStatus::Active.to_db_str()],
        )
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, warp_id: &str) -> RepositoryResult<Option<Warp>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, warp_id)
    }

    pub fn find_by_code(&self, warp_code: &str) -> RepositoryResult<Option<Warp>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM warps WHERE warp_code = ?1", WARP_COLUMNS);
        let warp = conn
            .query_row(&sql, params![warp_code], Self::map_row)
            .optional()?;
        Ok(warp)
    }

    pub fn find_by_order_id(&self, order_id: &str) -> RepositoryResult<Vec<Warp>> {
        let conn = self.get_conn()?;
        Self::find_by_order_id_tx(&conn, order_id)
    }

    pub fn find_active_by_loom(&self, loom_id: &str) -> RepositoryResult<Vec<Warp>> {
        let conn = self.get_conn()?;
        Self::find_active_by_loom_tx(&conn, loom_id)
    }

    pub fn find_by_status(&self, status: WarpStatus) -> RepositoryResult<Vec<Warp>> {
        let conn = self.get_conn()?;
        Self::query_list(&conn, "WHERE status = ?1", &[&status.to_db_str()])
    }

    /// 全量扫描
    pub fn find_all(&self) -> RepositoryResult<Vec<Warp>> {
        let conn = self.get_conn()?;
        Self::query_list(&conn, "", &[])
    }
}

#[async_trait]
impl PointReader<Warp> for WarpRepository {
    async fn read_point(&self, id: &str) -> RepositoryResult<Option<Warp>> {
        self.find_by_id(id)
    }
}

/// 订单 → 经轴
#[async_trait]
impl ChildReader<Warp> for WarpRepository {
    async fn read_children(&self, parent_id: &str) -> RepositoryResult<Vec<Warp>> {
        self.find_by_order_id(parent_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::order::Order;
    use crate::domain::types::{OrderStatus, OrderType};
    use crate::repository::order_repo::OrderRepository;
    use chrono::Utc;

    fn setup() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        let now = Utc::now().naive_utc();
        OrderRepository::insert_tx(
            &conn,
            &Order {
                order_id: "o1".to_string(),
                order_number: "SO-2026-0001".to_string(),
                order_type: OrderType::Sales,
                party_name: "Shree Fabrics".to_string(),
                quality: None,
                order_quantity: 1000.0,
                warping_quantity: 1100.0,
                status: OrderStatus::Pending,
                revision: 0,
                created_at: now,
                updated_at: now,
            },
        )
        .unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn make_warp(id: &str, code: &str, loom_id: &str, quantity: f64) -> Warp {
        let now = Utc::now().naive_utc();
        Warp {
            warp_id: id.to_string(),
            warp_code: code.to_string(),
            order_id: "o1".to_string(),
            loom_id: loom_id.to_string(),
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
    fn test_insert_and_query_by_order_and_loom() {
        let conn = setup();
        let repo = WarpRepository::new(conn.clone());
        {
            let c = conn.lock().unwrap();
            WarpRepository::insert_tx(&c, &make_warp("w1", "W1", "l1", 600.0)).unwrap();
            WarpRepository::insert_tx(&c, &make_warp("w2", "W2", "l2", 500.0)).unwrap();
        }

        assert_eq!(repo.find_by_order_id("o1").unwrap().len(), 2);
        assert_eq!(repo.find_active_by_loom("l1").unwrap().len(), 1);
        assert_eq!(repo.find_by_code("W2").unwrap().unwrap().warp_id, "w2");
        assert!(repo.find_by_id("w9").unwrap().is_none());
    }

    #[test]
    fn test_update_moves_warp_out_of_active_set() {
        let conn = setup();
        let repo = WarpRepository::new(conn.clone());
        let mut warp = make_warp("w1", "W1", "l1", 1100.0);
        {
            let c = conn.lock().unwrap();
            WarpRepository::insert_tx(&c, &warp).unwrap();

            warp.original_quantity = Some(1100.0);
            warp.used_quantity = Some(1000.0);
            warp.quantity = 100.0;
            warp.status = WarpStatus::Stopped;
            warp.completion_date = Some(Utc::now().naive_utc());
            WarpRepository::update_tx(&c, &warp).unwrap();
        }

        assert!(repo.find_active_by_loom("l1").unwrap().is_empty());
        let stored = repo.find_by_id("w1").unwrap().unwrap();
        assert_eq!(stored.status, WarpStatus::Stopped);
        assert_eq!(stored.original_quantity, Some(1100.0));
        assert_eq!(repo.find_by_status(WarpStatus::Stopped).unwrap().len(), 1);
    }

    #[test]
    fn test_update_missing_warp_is_not_found() {
        let conn = setup();
        let c = conn.lock().unwrap();
        let err = WarpRepository::update_tx(&c, &make_warp("ghost", "W9", "l1", 1.0)).unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }

    #[test]
    fn test_duplicate_warp_code_rejected() {
        let conn = setup();
        let c = conn.lock().unwrap();
        WarpRepository::insert_tx(&c, &make_warp("w1", "W1", "l1", 1.0)).unwrap();
        let err = WarpRepository::insert_tx(&c, &make_warp("w2", "W1", "l2", 1.0)).unwrap_err();
        assert!(matches!(err, RepositoryError::UniqueConstraintViolation(_)));
    }
}

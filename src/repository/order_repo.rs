// ==========================================
// 纺织生产追溯系统 - 订单数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 说明: *_tx 关联函数接受 &Connection（Transaction 可解引用），
//       供 API 层在同一事务内组合多集合写入
// ==========================================

use crate::db::invalid_column;
use crate::domain::order::{FreedQuantity, Order};
use crate::domain::types::{OrderStatus, OrderType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::reader::PointReader;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const ORDER_COLUMNS: &str = "order_id, order_number, order_type, party_name, quality, \
     order_quantity, warping_quantity, status, revision, created_at, updated_at";

/// 释放量余额小于该值视为耗尽
pub const FREED_EPSILON: f64 = 1e-9;

// ==========================================
// OrderRepository - 订单仓储
// ==========================================
pub struct OrderRepository {
    conn: Arc<Mutex<Connection>>,
}

impl OrderRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn map_row(row: &Row) -> rusqlite::Result<Order> {
        let order_type: String = row.get(2)?;
        let status: String = row.get(7)?;
        Ok(Order {
            order_id: row.get(0)?,
            order_number: row.get(1)?,
            order_type: OrderType::from_db_str(&order_type)
                .ok_or_else(|| invalid_column(2, &order_type, "订单类型"))?,
            party_name: row.get(3)?,
            quality: row.get(4)?,
            order_quantity: row.get(5)?,
            warping_quantity: row.get(6)?,
            status: OrderStatus::from_db_str(&status)
                .ok_or_else(|| invalid_column(7, &status, "订单状态"))?,
            revision: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn insert_tx(conn: &Connection, order: &Order) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO orders (
                order_id, order_number, order_type, party_name, quality,
                order_quantity, warping_quantity, status, revision, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
            params![
                order.order_id,
                order.order_number,
                order.order_type.to_db_str(),
                order.party_name,
                order.quality,
                order.order_quantity,
                order.warping_quantity,
                order.status.to_db_str(),
                order.revision,
                order.created_at,
                order.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, order_id: &str) -> RepositoryResult<Option<Order>> {
        let sql = format!("SELECT {} FROM orders WHERE order_id = ?1", ORDER_COLUMNS);
        let order = conn
            .query_row(&sql, params![order_id], Self::map_row)
            .optional()?;
        Ok(order)
    }

    /// 更新订单状态（带乐观锁检查，成功后 revision + 1）
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision 不匹配
    /// - `RepositoryError::NotFound`: order_id 不存在
    pub fn update_status_tx(
        conn: &Connection,
        order_id: &str,
        status: OrderStatus,
        expected_revision: i64,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        let rows_affected = conn.execute(
            r#"UPDATE orders
               SET status = ?1, revision = revision + 1, updated_at = ?2
               WHERE order_id = ?3 AND revision = ?4"#,
            params![status.to_db_str(), updated_at, order_id, expected_revision],
        )?;

        if rows_affected == 0 {
            let actual: Option<i64> = conn
                .query_row(
                    "SELECT revision FROM orders WHERE order_id = ?1",
                    params![order_id],
                    |row| row.get(0),
                )
                .optional()?;

            return match actual {
                Some(actual) => Err(RepositoryError::OptimisticLockFailure {
                    entity: "Order".to_string(),
                    id: order_id.to_string(),
                    expected: expected_revision,
                    actual,
                }),
                None => Err(RepositoryError::not_found("Order", order_id)),
            };
        }

        Ok(())
    }

    // ==========================================
    // 查询
    // ==========================================

    pub fn find_by_id(&self, order_id: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, order_id)
    }

    pub fn find_by_order_number(&self, order_number: &str) -> RepositoryResult<Option<Order>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM orders WHERE order_number = ?1", ORDER_COLUMNS);
        let order = conn
            .query_row(&sql, params![order_number], Self::map_row)
            .optional()?;
        Ok(order)
    }

    /// 全量扫描（按创建时间倒序）
    pub fn find_all(&self) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM orders ORDER BY created_at DESC", ORDER_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map([], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }

    pub fn find_by_status(&self, status: OrderStatus) -> RepositoryResult<Vec<Order>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM orders WHERE status = ?1 ORDER BY created_at DESC",
            ORDER_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map(params![status.to_db_str()], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(orders)
    }
}

#[async_trait]
impl PointReader<Order> for OrderRepository {
    async fn read_point(&self, id: &str) -> RepositoryResult<Option<Order>> {
        self.find_by_id(id)
    }
}

// ==========================================
// FreedQuantityRepository - 释放量池仓储
// ==========================================
// 红线: 余额 ≤ 0 时不保留记录
pub struct FreedQuantityRepository {
    conn: Arc<Mutex<Connection>>,
}

impl FreedQuantityRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_tx(conn: &Connection, order_id: &str) -> RepositoryResult<Option<FreedQuantity>> {
        let record = conn
            .query_row(
                r#"SELECT order_id, total_freed_quantity, updated_at
                   FROM freed_quantity WHERE order_id = ?1"#,
                params![order_id],
                |row| {
                    Ok(FreedQuantity {
                        order_id: row.get(0)?,
                        total_freed_quantity: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// 写入余额；余额耗尽时删除记录
    pub fn set_balance_tx(
        conn: &Connection,
        order_id: &str,
        balance: f64,
        updated_at: NaiveDateTime,
    ) -> RepositoryResult<()> {
        if balance <= FREED_EPSILON {
            conn.execute(
                "DELETE FROM freed_quantity WHERE order_id = ?1",
                params![order_id],
            )?;
            return Ok(());
        }

        conn.execute(
            r#"INSERT INTO freed_quantity (order_id, total_freed_quantity, updated_at)
               VALUES (?1, ?2, ?3)
               ON CONFLICT(order_id) DO UPDATE SET
                   total_freed_quantity = excluded.total_freed_quantity,
                   updated_at = excluded.updated_at"#,
            params![order_id, balance, updated_at],
        )?;
        Ok(())
    }

    /// 余额（无记录时为 0）
    pub fn balance_tx(conn: &Connection, order_id: &str) -> RepositoryResult<f64> {
        Ok(Self::find_tx(conn, order_id)?
            .map(|r| r.total_freed_quantity)
            .unwrap_or(0.0))
    }

    pub fn find(&self, order_id: &str) -> RepositoryResult<Option<FreedQuantity>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, order_id)
    }

    pub fn balance(&self, order_id: &str) -> RepositoryResult<f64> {
        let conn = self.get_conn()?;
        Self::balance_tx(&conn, order_id)
    }
}

#[async_trait]
impl PointReader<FreedQuantity> for FreedQuantityRepository {
    async fn read_point(&self, id: &str) -> RepositoryResult<Option<FreedQuantity>> {
        self.find(id)
    }
}

// ==========================================
// SequenceCounterRepository - 序号计数器
// ==========================================
// 单条 UPSERT 原子自增；作用域如 "order:2026:SALES" / "warp"
pub struct SequenceCounterRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SequenceCounterRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 自增并返回新值（首个值为 1）
    pub fn next_value_tx(conn: &Connection, scope: &str) -> RepositoryResult<i64> {
        let value = conn.query_row(
            r#"INSERT INTO sequence_counter (scope, last_value) VALUES (?1, 1)
               ON CONFLICT(scope) DO UPDATE SET last_value = last_value + 1
               RETURNING last_value"#,
            params![scope],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    /// 当前值（未使用过的作用域为 0）
    pub fn current_value(&self, scope: &str) -> RepositoryResult<i64> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let value: Option<i64> = conn
            .query_row(
                "SELECT last_value FROM sequence_counter WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }
}

// ==========================================
// 纺织生产追溯系统 - SQLite 连接与 Schema
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 集合 = 表；外键查询全部走索引，不做 JOIN（关联视图由 engine::enrichment 拼装）
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared_connection(db_path: &str) -> RepositoryResult<Arc<Mutex<Connection>>> {
    let conn = open_sqlite_connection(db_path)?;
    init_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化 schema（幂等）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    if read_schema_version(conn)?.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 在 IMMEDIATE 事务内执行闭包
///
/// 说明：
/// - BEGIN IMMEDIATE 在读之前即取得写锁，读-判定-写 之间不会被其他连接插入写入
/// - 闭包返回 Err 时事务随 Transaction drop 回滚
pub fn with_immediate_transaction<T, E, F>(conn: &Arc<Mutex<Connection>>, f: F) -> Result<T, E>
where
    F: FnOnce(&Transaction<'_>) -> Result<T, E>,
    E: From<RepositoryError>,
{
    let mut guard = conn
        .lock()
        .map_err(|e| RepositoryError::LockError(e.to_string()))?;
    let tx = guard
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(RepositoryError::from)?;

    let value = f(&tx)?;

    tx.commit().map_err(RepositoryError::from)?;
    Ok(value)
}

/// 列值解析失败时构造 rusqlite 错误
pub fn invalid_column(idx: usize, value: &str, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("无效的{}: {}", what, value).into(),
    )
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS sequence_counter (
    scope TEXT PRIMARY KEY,
    last_value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_id TEXT PRIMARY KEY,
    order_number TEXT NOT NULL UNIQUE,
    order_type TEXT NOT NULL,
    party_name TEXT NOT NULL,
    quality TEXT,
    order_quantity REAL NOT NULL CHECK (order_quantity > 0),
    warping_quantity REAL NOT NULL,
    status TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (warping_quantity > order_quantity)
);
CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);

CREATE TABLE IF NOT EXISTS freed_quantity (
    order_id TEXT PRIMARY KEY REFERENCES orders(order_id),
    total_freed_quantity REAL NOT NULL CHECK (total_freed_quantity > 0),
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS looms (
    loom_id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    loom_name TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (company_name, loom_name)
);
CREATE INDEX IF NOT EXISTS idx_looms_status ON looms(status);

-- loom_id 不设外键：织机删除后经轴仍保留历史引用
CREATE TABLE IF NOT EXISTS warps (
    warp_id TEXT PRIMARY KEY,
    warp_code TEXT NOT NULL UNIQUE,
    order_id TEXT NOT NULL REFERENCES orders(order_id),
    loom_id TEXT NOT NULL,
    quantity REAL NOT NULL CHECK (quantity >= 0),
    original_quantity REAL,
    used_quantity REAL,
    freed_drawdown REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    start_date TEXT NOT NULL,
    end_date TEXT,
    completion_date TEXT,
    loom_name_snapshot TEXT NOT NULL,
    company_name_snapshot TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_warps_order ON warps(order_id);
CREATE INDEX IF NOT EXISTS idx_warps_loom_status ON warps(loom_id, status);
CREATE INDEX IF NOT EXISTS idx_warps_status ON warps(status);

CREATE TABLE IF NOT EXISTS fabric_cuts (
    fabric_cut_id TEXT PRIMARY KEY,
    warp_id TEXT NOT NULL REFERENCES warps(warp_id),
    fabric_number TEXT NOT NULL,
    cut_number INTEGER NOT NULL,
    quantity REAL NOT NULL CHECK (quantity > 0),
    parent_fabric_id TEXT,
    sub_cut_number INTEGER,
    scan_code TEXT NOT NULL,
    loom_name_snapshot TEXT NOT NULL,
    company_name_snapshot TEXT NOT NULL,
    inspection_arrived_at TEXT,
    inspected INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (warp_id, fabric_number)
);
CREATE INDEX IF NOT EXISTS idx_fabric_cuts_number ON fabric_cuts(fabric_number);
CREATE INDEX IF NOT EXISTS idx_fabric_cuts_warp ON fabric_cuts(warp_id);

CREATE TABLE IF NOT EXISTS inspection_records (
    inspection_id TEXT PRIMARY KEY,
    fabric_number TEXT NOT NULL,
    fabric_cut_id TEXT NOT NULL,
    inspector TEXT NOT NULL,
    result TEXT NOT NULL,
    remarks TEXT,
    inspected_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inspection_fabric_number ON inspection_records(fabric_number);

CREATE TABLE IF NOT EXISTS action_log (
    action_id TEXT PRIMARY KEY,
    action_type TEXT NOT NULL,
    action_ts TEXT NOT NULL,
    actor TEXT NOT NULL,
    target_kind TEXT NOT NULL,
    target_id TEXT NOT NULL,
    order_id TEXT,
    payload_json TEXT,
    detail TEXT
);
CREATE INDEX IF NOT EXISTS idx_action_ts ON action_log(action_ts);
CREATE INDEX IF NOT EXISTS idx_action_target ON action_log(target_kind, target_id);
CREATE INDEX IF NOT EXISTS idx_action_order ON action_log(order_id, action_ts);
"#;

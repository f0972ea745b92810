// ==========================================
// 纺织生产追溯系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::trace_config_trait::{
    ConfigResult, TraceConfigReader, DEFAULT_ALLOCATION_MAX_RETRIES,
    DEFAULT_ENRICHMENT_MAX_CONCURRENCY, DEFAULT_MEMBERSHIP_FILTER_CAP,
    DEFAULT_SPLIT_QUANTITY_TOLERANCE, MAX_SPLIT_QUANTITY_TOLERANCE, MIN_MEMBERSHIP_FILTER_CAP,
};
use crate::db::open_sqlite_connection;
use crate::domain::types::LoomReassignPolicy;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        Ok(Self::get_global_config_value_tx(&conn, key)?)
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        Self::set_global_config_value_tx(&conn, key, value)?;
        Ok(())
    }

    /// 在调用方事务内读取 global 配置值
    pub fn get_global_config_value_tx(
        conn: &Connection,
        key: &str,
    ) -> rusqlite::Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
    }

    /// 在调用方事务内写入 global 配置值（UPSERT）
    pub fn set_global_config_value_tx(
        conn: &Connection,
        key: &str,
        value: &str,
    ) -> rusqlite::Result<()> {
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value, updated_at)
               VALUES ('global', ?1, ?2, datetime('now'))
               ON CONFLICT(scope_id, key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at"#,
            params![key, value],
        )?;
        tracing::info!(config_key = key, value = value, "配置已更新");
        Ok(())
    }

    /// 解析数值配置；缺失或格式错误时回退默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };

        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }

    /// 获取所有配置的快照（JSON格式）
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        Ok(serde_json::to_string(&json!(config_map))?)
    }
}

// ==========================================
// TraceConfigReader Trait 实现
// ==========================================
#[async_trait]
impl TraceConfigReader for ConfigManager {
    async fn get_enrichment_max_concurrency(&self) -> ConfigResult<usize> {
        let value = self.get_parsed_or_default(
            config_keys::ENRICHMENT_MAX_CONCURRENCY,
            DEFAULT_ENRICHMENT_MAX_CONCURRENCY,
        )?;
        Ok(value.max(1))
    }

    async fn get_allocation_max_retries(&self) -> ConfigResult<u32> {
        self.get_parsed_or_default(
            config_keys::ALLOCATION_MAX_RETRIES,
            DEFAULT_ALLOCATION_MAX_RETRIES,
        )
    }

    async fn get_split_quantity_tolerance(&self) -> ConfigResult<f64> {
        let value = self.get_parsed_or_default(
            config_keys::SPLIT_QUANTITY_TOLERANCE,
            DEFAULT_SPLIT_QUANTITY_TOLERANCE,
        )?;
        if value.is_finite() && value > 0.0 {
            Ok(value.min(MAX_SPLIT_QUANTITY_TOLERANCE))
        } else {
            Ok(DEFAULT_SPLIT_QUANTITY_TOLERANCE)
        }
    }

    async fn get_membership_filter_cap(&self) -> ConfigResult<usize> {
        let value = self.get_parsed_or_default(
            config_keys::MEMBERSHIP_FILTER_CAP,
            DEFAULT_MEMBERSHIP_FILTER_CAP,
        )?;
        Ok(value.max(MIN_MEMBERSHIP_FILTER_CAP))
    }

    async fn get_loom_reassign_policy(&self) -> ConfigResult<LoomReassignPolicy> {
        let value = self.get_config_value(config_keys::LOOM_REASSIGN_POLICY)?;
        Ok(value
            .as_deref()
            .and_then(LoomReassignPolicy::from_db_str)
            .unwrap_or(LoomReassignPolicy::Strict))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 关联读取
    pub const ENRICHMENT_MAX_CONCURRENCY: &str = "enrichment.max_concurrency";

    // 经轴分配
    pub const ALLOCATION_MAX_RETRIES: &str = "allocation.max_retries";

    // 分匹
    pub const SPLIT_QUANTITY_TOLERANCE: &str = "split.quantity_tolerance";

    // 存储契约
    pub const MEMBERSHIP_FILTER_CAP: &str = "store.membership_filter_cap";

    // 织机改派 (STRICT / LEGACY)
    pub const LOOM_REASSIGN_POLICY: &str = "loom.reassign_policy";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::trace_config_trait::TraceSettings;

    fn setup() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let config = setup();
        let settings = config.load_settings().await.unwrap();
        assert_eq!(settings, TraceSettings::default());
    }

    #[tokio::test]
    async fn test_overrides_and_invalid_values() {
        let config = setup();
        config
            .set_global_config_value(config_keys::LOOM_REASSIGN_POLICY, "legacy")
            .unwrap();
        config
            .set_global_config_value(config_keys::ENRICHMENT_MAX_CONCURRENCY, "3")
            .unwrap();
        config
            .set_global_config_value(config_keys::SPLIT_QUANTITY_TOLERANCE, "abc")
            .unwrap();

        let settings = config.load_settings().await.unwrap();
        assert_eq!(settings.loom_reassign_policy, LoomReassignPolicy::Legacy);
        assert_eq!(settings.enrichment_max_concurrency, 3);
        assert_eq!(settings.split_quantity_tolerance, DEFAULT_SPLIT_QUANTITY_TOLERANCE);
    }

    #[tokio::test]
    async fn test_out_of_range_values_are_clamped() {
        let config = setup();
        config
            .set_global_config_value(config_keys::SPLIT_QUANTITY_TOLERANCE, "1")
            .unwrap();
        config
            .set_global_config_value(config_keys::MEMBERSHIP_FILTER_CAP, "5")
            .unwrap();

        let settings = config.load_settings().await.unwrap();
        assert_eq!(settings.split_quantity_tolerance, MAX_SPLIT_QUANTITY_TOLERANCE);
        assert_eq!(settings.membership_filter_cap, MIN_MEMBERSHIP_FILTER_CAP);

        // 收紧的容差保持原值
        config
            .set_global_config_value(config_keys::SPLIT_QUANTITY_TOLERANCE, "0.005")
            .unwrap();
        assert_eq!(config.get_split_quantity_tolerance().await.unwrap(), 0.005);
    }

    #[test]
    fn test_snapshot_contains_overrides() {
        let config = setup();
        config
            .set_global_config_value(config_keys::ALLOCATION_MAX_RETRIES, "9")
            .unwrap();
        let snapshot: serde_json::Value =
            serde_json::from_str(&config.get_config_snapshot().unwrap()).unwrap();
        assert_eq!(snapshot["allocation.max_retries"], "9");
    }
}

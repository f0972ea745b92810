// ==========================================
// 纺织生产追溯系统 - 配置管理 API
// ==========================================
// 职责: 运行配置查询、校验后覆写
// ==========================================

use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde_json::json;
use tracing::info;

use crate::api::common::load_settings;
use crate::api::error::{ApiError, ApiResult};
use crate::config::trace_config_trait::{MAX_SPLIT_QUANTITY_TOLERANCE, MIN_MEMBERSHIP_FILTER_CAP};
use crate::config::{config_keys, ConfigManager, TraceConfigReader, TraceSettings};
use crate::db::with_immediate_transaction;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::types::LoomReassignPolicy;
use crate::repository::{ActionLogRepository, RepositoryError};

pub struct ConfigApi {
    conn: Arc<Mutex<Connection>>,
    config_manager: Arc<ConfigManager>,
}

impl ConfigApi {
    pub fn new(conn: Arc<Mutex<Connection>>, config_manager: Arc<ConfigManager>) -> Self {
        Self {
            conn,
            config_manager,
        }
    }

    /// 当前生效配置（缺省项已填充默认值）
    pub async fn get_settings(&self) -> ApiResult<TraceSettings> {
        load_settings(self.config_manager.as_ref() as &dyn TraceConfigReader).await
    }

    /// 已覆写配置项快照（JSON）
    pub fn get_config_snapshot(&self) -> ApiResult<String> {
        self.config_manager
            .get_config_snapshot()
            .map_err(|e| ApiError::InternalError(format!("配置快照读取失败: {}", e)))
    }

    /// 覆写配置项（仅接受已知键，值先校验）
    ///
    /// 配置写入与操作日志在同一事务内
    pub fn update_config(&self, key: &str, value: &str, actor: &str) -> ApiResult<()> {
        let value = validate_config_value(key, value)?;

        with_immediate_transaction(&self.conn, |tx| -> ApiResult<()> {
            let previous = ConfigManager::get_global_config_value_tx(tx, key)
                .map_err(RepositoryError::from)?;
            ConfigManager::set_global_config_value_tx(tx, key, &value)
                .map_err(RepositoryError::from)?;
            ActionLogRepository::insert_tx(
                tx,
                &ActionLog::new(
                    ActionType::UpdateConfig,
                    actor,
                    key,
                    None,
                    Some(json!({ "from": previous, "to": value })),
                    format!("配置 {} = {}", key, value),
                ),
            )?;
            Ok(())
        })?;

        info!(config_key = key, "配置覆写已记录");
        Ok(())
    }
}

/// 按键校验配置值，返回规范化后的字符串
fn validate_config_value(key: &str, value: &str) -> ApiResult<String> {
    let value = value.trim();
    let invalid = || ApiError::ValidationError(format!("配置值无效: {} = {}", key, value));

    match key {
        config_keys::ENRICHMENT_MAX_CONCURRENCY | config_keys::MEMBERSHIP_FILTER_CAP => {
            let n: usize = value.parse().map_err(|_| invalid())?;
            if n == 0 {
                return Err(invalid());
            }
            // 子匹扫码最多 8 个候选
            if key == config_keys::MEMBERSHIP_FILTER_CAP && n < MIN_MEMBERSHIP_FILTER_CAP {
                return Err(ApiError::ValidationError(format!(
                    "{} 不能小于 {}: {}",
                    key, MIN_MEMBERSHIP_FILTER_CAP, n
                )));
            }
            Ok(n.to_string())
        }
        config_keys::ALLOCATION_MAX_RETRIES => {
            let n: u32 = value.parse().map_err(|_| invalid())?;
            Ok(n.to_string())
        }
        config_keys::SPLIT_QUANTITY_TOLERANCE => {
            let t: f64 = value.parse().map_err(|_| invalid())?;
            if !t.is_finite() || t <= 0.0 {
                return Err(invalid());
            }
            if t > MAX_SPLIT_QUANTITY_TOLERANCE {
                return Err(ApiError::ValidationError(format!(
                    "{} 不能大于 {}: {}",
                    key, MAX_SPLIT_QUANTITY_TOLERANCE, t
                )));
            }
            Ok(t.to_string())
        }
        config_keys::LOOM_REASSIGN_POLICY => LoomReassignPolicy::from_db_str(value)
            .map(|p| p.to_db_str().to_string())
            .ok_or_else(invalid),
        _ => Err(ApiError::ValidationError(format!("未知配置项: {}", key))),
    }
}

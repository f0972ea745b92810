// ==========================================
// 纺织生产追溯系统 - 应用状态
// ==========================================
// 职责: 管理进程级共享连接、仓储、关联管线与 API 实例
// ==========================================

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::api::{ActionLogApi, ConfigApi, FabricCutApi, LoomApi, OrderApi, WarpApi};
use crate::config::{ConfigManager, TraceConfigReader};
use crate::config::trace_config_trait::DEFAULT_ENRICHMENT_MAX_CONCURRENCY;
use crate::db::{init_schema, open_sqlite_connection};
use crate::engine::enrichment::EnrichmentPipeline;
use crate::perf;
use crate::repository::{
    ActionLogRepository, FabricCutRepository, FreedQuantityRepository, InspectionRepository,
    LoomRepository, OrderRepository, WarpRepository,
};

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "TEXTILE_TRACE_DB_PATH";

/// 应用状态
///
/// 所有仓储与 API 共用同一个 `Arc<Mutex<Connection>>`
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub order_api: Arc<OrderApi>,
    pub warp_api: Arc<WarpApi>,
    pub loom_api: Arc<LoomApi>,
    pub fabric_cut_api: Arc<FabricCutApi>,
    pub action_log_api: Arc<ActionLogApi>,
    pub config_api: Arc<ConfigApi>,

    /// 配置管理器（直接覆写配置用）
    pub config_manager: Arc<ConfigManager>,
}

impl AppState {
    /// 创建 AppState
    ///
    /// 1. 打开共享连接（PRAGMA + SQL 追踪 + 建表）
    /// 2. 初始化 Repository 与关联管线
    /// 3. 创建 API 实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化 AppState");

        let mut conn =
            open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        perf::install_sqlite_tracing(&mut conn);
        init_schema(&conn).map_err(|e| format!("数据库初始化失败: {}", e))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // Repository 层
        // ==========================================
        let order_repo = Arc::new(OrderRepository::new(conn.clone()));
        let freed_repo = Arc::new(FreedQuantityRepository::new(conn.clone()));
        let loom_repo = Arc::new(LoomRepository::new(conn.clone()));
        let warp_repo = Arc::new(WarpRepository::new(conn.clone()));
        let cut_repo = Arc::new(FabricCutRepository::new(conn.clone()));
        let inspection_repo = Arc::new(InspectionRepository::new(conn.clone()));
        let action_log_repo = Arc::new(ActionLogRepository::new(conn.clone()));

        // ==========================================
        // 配置与关联管线
        // ==========================================
        let config_manager = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );
        let config: Arc<dyn TraceConfigReader> = config_manager.clone();

        // 并发上限按请求从配置覆盖，这里仅为默认值
        let pipeline = Arc::new(EnrichmentPipeline::new(
            order_repo.clone(),
            loom_repo.clone(),
            warp_repo.clone(),
            warp_repo.clone(),
            freed_repo.clone(),
            DEFAULT_ENRICHMENT_MAX_CONCURRENCY,
        ));

        // ==========================================
        // API 层
        // ==========================================
        let order_api = Arc::new(OrderApi::new(
            conn.clone(),
            order_repo,
            warp_repo.clone(),
            freed_repo,
            pipeline.clone(),
            config.clone(),
        ));
        let warp_api = Arc::new(WarpApi::new(
            conn.clone(),
            warp_repo,
            pipeline.clone(),
            config.clone(),
        ));
        let loom_api = Arc::new(LoomApi::new(conn.clone(), loom_repo));
        let fabric_cut_api = Arc::new(FabricCutApi::new(
            conn.clone(),
            cut_repo,
            inspection_repo,
            pipeline,
            config,
        ));
        let action_log_api = Arc::new(ActionLogApi::new(action_log_repo));
        let config_api = Arc::new(ConfigApi::new(conn, config_manager.clone()));

        tracing::info!("AppState 初始化完成");

        Ok(Self {
            db_path,
            order_api,
            warp_api,
            loom_api,
            fabric_cut_api,
            action_log_api,
            config_api,
            config_manager,
        })
    }
}

/// 默认数据库路径
///
/// 优先使用 `TEXTILE_TRACE_DB_PATH`，否则放在用户数据目录下
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./textile_trace.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("textile-trace");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("textile_trace.db");
        }
    }
    path.to_string_lossy().to_string()
}

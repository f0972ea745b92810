// ==========================================
// 纺织生产追溯系统 - 核心库
// ==========================================
// 范围: 订单整经量分配 / 织机状态 / 经轴生命周期 / 布匹扫码与分匹 / 关联视图
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则与关联拼装
pub mod engine;

// 导入层 - 织机名册
pub mod importer;

// 配置层 - 运行配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/Schema）
pub mod db;

// 日志系统
pub mod logging;

// SQL 性能观测
pub mod perf;

// API 层 - 业务接口
pub mod api;

// 应用层 - 装配
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{LoomReassignPolicy, LoomStatus, OrderStatus, OrderType, WarpStatus};

// 领域实体
pub use domain::{ActionLog, ActionType, FabricCut, InspectionRecord, Loom, Order, Warp};

// 引擎
pub use engine::{EnrichOptions, EnrichmentPipeline, RuleViolation};

// API
pub use api::{ApiError, ApiResult};
pub use app::AppState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "纺织生产追溯系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

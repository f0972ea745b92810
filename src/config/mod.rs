// ==========================================
// 纺织生产追溯系统 - 配置层
// ==========================================
// 职责: 运行参数管理
// 存储: config_kv 表 (scope_id = 'global')
// ==========================================

pub mod config_manager;
pub mod trace_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use trace_config_trait::{ConfigResult, TraceConfigReader, TraceSettings};

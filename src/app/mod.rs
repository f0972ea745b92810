// ==========================================
// 纺织生产追溯系统 - 应用层
// ==========================================
// 职责: 装配共享连接、仓储与 API
// ==========================================

pub mod state;

// 重导出
pub use state::{get_default_db_path, AppState, DB_PATH_ENV};

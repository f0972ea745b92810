// ==========================================
// 纺织生产追溯系统 - 导入层
// ==========================================
// 职责: 外部数据导入（织机名册 CSV）
// ==========================================

pub mod error;
pub mod file_parser;
pub mod loom_roster;

// 重导出核心类型
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, RawRow};
pub use loom_roster::{map_rows, LoomRosterRow, RowIssue};

// ==========================================
// 纺织生产追溯系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约束: 只提供点查 / 等值过滤 / 成员过滤 / 全量扫描，不做 JOIN
// ==========================================

pub mod action_log_repo;
pub mod error;
pub mod fabric_cut_repo;
pub mod inspection_repo;
pub mod loom_repo;
pub mod order_repo;
pub mod reader;
pub mod warp_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use fabric_cut_repo::FabricCutRepository;
pub use inspection_repo::InspectionRepository;
pub use loom_repo::LoomRepository;
pub use order_repo::{FreedQuantityRepository, OrderRepository, SequenceCounterRepository};
pub use reader::{ChildReader, PointReader};
pub use warp_repo::WarpRepository;

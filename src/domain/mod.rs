// ==========================================
// 纺织生产追溯系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod fabric_cut;
pub mod loom;
pub mod order;
pub mod types;
pub mod warp;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use fabric_cut::{FabricCut, InspectionRecord};
pub use loom::{Loom, LoomSnapshot};
pub use order::{FreedQuantity, Order};
pub use types::{LoomReassignPolicy, LoomStatus, OrderStatus, OrderType, WarpStatus};
pub use warp::Warp;

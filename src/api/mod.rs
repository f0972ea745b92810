// ==========================================
// 纺织生产追溯系统 - API 层
// ==========================================
// 职责: 对外业务接口（订单 / 经轴 / 织机 / 布匹 / 日志 / 配置）
// 所有写操作: IMMEDIATE 事务 + 同事务写 ActionLog
// ==========================================

mod common;

pub mod action_log_api;
pub mod config_api;
pub mod error;
pub mod fabric_cut_api;
pub mod loom_api;
pub mod order_api;
pub mod warp_api;

// 重导出核心类型
pub use action_log_api::ActionLogApi;
pub use config_api::ConfigApi;
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use fabric_cut_api::{FabricCutApi, RecordInspectionRequest};
pub use loom_api::{CreateLoomRequest, LoomApi, LoomImportReport};
pub use order_api::{CreateOrderRequest, OrderApi};
pub use warp_api::{CreateWarpRequest, UpdateWarpRequest, WarpApi};

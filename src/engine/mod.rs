// ==========================================
// 纺织生产追溯系统 - 引擎层
// ==========================================
// 职责: 实现业务规则与关联拼装,不拼 SQL
// 红线: Engine 不写库, 规则违反必须携带原因
// ==========================================

pub mod allocator;
pub mod enrichment;
pub mod error;
pub mod loom_state;
pub mod scan_code;
pub mod splitter;
pub mod warp_lifecycle;

// 重导出核心引擎
pub use allocator::{AllocationPlan, AllocationSummary};
pub use enrichment::{
    EnrichOptions, EnrichmentPipeline, FabricCutQuery, FabricCutSort, FabricCutView, LoomRef,
    OrderQuery, OrderRef, OrderView, WarpQuery, WarpSort, WarpView,
};
pub use error::{RuleResult, RuleViolation};
pub use scan_code::DecodedScan;

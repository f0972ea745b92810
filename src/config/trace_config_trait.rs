// ==========================================
// 纺织生产追溯系统 - 运行配置读取 Trait
// ==========================================
// 职责: 定义业务层所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::types::LoomReassignPolicy;
use async_trait::async_trait;
use serde::Serialize;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// 默认值
// ==========================================
pub const DEFAULT_ENRICHMENT_MAX_CONCURRENCY: usize = 8;
pub const DEFAULT_ALLOCATION_MAX_RETRIES: u32 = 5;
pub const DEFAULT_SPLIT_QUANTITY_TOLERANCE: f64 = 0.01;
pub const DEFAULT_MEMBERSHIP_FILTER_CAP: usize = 10;

// ==========================================
// 取值边界
// ==========================================
/// 分匹容差上限：合计偏差必须小于 0.01
pub const MAX_SPLIT_QUANTITY_TOLERANCE: f64 = 0.01;
/// 成员过滤下限：子匹扫码展开为 8 个候选
pub const MIN_MEMBERSHIP_FILTER_CAP: usize = 8;

// ==========================================
// TraceSettings - 单次操作使用的配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceSettings {
    pub enrichment_max_concurrency: usize,
    pub allocation_max_retries: u32,
    pub split_quantity_tolerance: f64,
    pub membership_filter_cap: usize,
    pub loom_reassign_policy: LoomReassignPolicy,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            enrichment_max_concurrency: DEFAULT_ENRICHMENT_MAX_CONCURRENCY,
            allocation_max_retries: DEFAULT_ALLOCATION_MAX_RETRIES,
            split_quantity_tolerance: DEFAULT_SPLIT_QUANTITY_TOLERANCE,
            membership_filter_cap: DEFAULT_MEMBERSHIP_FILTER_CAP,
            loom_reassign_policy: LoomReassignPolicy::Strict,
        }
    }
}

// ==========================================
// TraceConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait TraceConfigReader: Send + Sync {
    /// 关联读取的最大并发数
    ///
    /// # 默认值
    /// - 8
    async fn get_enrichment_max_concurrency(&self) -> ConfigResult<usize>;

    /// 经轴分配遇到并发冲突时的最大重试次数
    ///
    /// # 默认值
    /// - 5
    async fn get_allocation_max_retries(&self) -> ConfigResult<u32>;

    /// 分匹数量之和与原数量的允许偏差（米），只能收紧不能放宽
    ///
    /// # 默认值
    /// - 0.01
    async fn get_split_quantity_tolerance(&self) -> ConfigResult<f64>;

    /// 单次成员过滤 (IN) 允许的候选数上限，不低于 8
    ///
    /// # 默认值
    /// - 10
    async fn get_membership_filter_cap(&self) -> ConfigResult<usize>;

    /// 织机改派策略
    ///
    /// # 默认值
    /// - STRICT
    async fn get_loom_reassign_policy(&self) -> ConfigResult<LoomReassignPolicy>;

    /// 一次性读取全部运行配置
    async fn load_settings(&self) -> ConfigResult<TraceSettings> {
        Ok(TraceSettings {
            enrichment_max_concurrency: self.get_enrichment_max_concurrency().await?,
            allocation_max_retries: self.get_allocation_max_retries().await?,
            split_quantity_tolerance: self.get_split_quantity_tolerance().await?,
            membership_filter_cap: self.get_membership_filter_cap().await?,
            loom_reassign_policy: self.get_loom_reassign_policy().await?,
        })
    }
}

// ==========================================
// 纺织生产追溯系统 - 存储读取契约
// ==========================================
// 存储只提供: 按主键点查 / 等值过滤 / 全量扫描
// 关联视图由 engine::enrichment 基于这两个 trait 扇出读取后拼装
// ==========================================

use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

/// 按主键点查
#[async_trait]
pub trait PointReader<T>: Send + Sync {
    async fn read_point(&self, id: &str) -> RepositoryResult<Option<T>>;
}

/// 按外键等值过滤（一对多）
#[async_trait]
pub trait ChildReader<T>: Send + Sync {
    async fn read_children(&self, parent_id: &str) -> RepositoryResult<Vec<T>>;
}

// ==========================================
// 纺织生产追溯系统 - 操作日志查询 API
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::ActionLog;
use crate::repository::ActionLogRepository;

/// 单次查询上限
pub const MAX_RECENT_LIMIT: i32 = 1000;

pub struct ActionLogApi {
    action_log_repo: Arc<ActionLogRepository>,
}

impl ActionLogApi {
    pub fn new(action_log_repo: Arc<ActionLogRepository>) -> Self {
        Self { action_log_repo }
    }

    /// 订单维度的数量流转记录（时间正序）
    pub fn list_by_order(&self, order_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self.action_log_repo.find_by_order(order_id)?)
    }

    /// 某对象的操作记录（时间倒序）
    pub fn list_by_target(&self, target_kind: &str, target_id: &str) -> ApiResult<Vec<ActionLog>> {
        Ok(self
            .action_log_repo
            .find_by_target(&target_kind.to_uppercase(), target_id)?)
    }

    pub fn list_recent(&self, limit: i32) -> ApiResult<Vec<ActionLog>> {
        if limit <= 0 || limit > MAX_RECENT_LIMIT {
            return Err(ApiError::ValidationError(format!(
                "limit 必须在 1 到 {} 之间: {}",
                MAX_RECENT_LIMIT, limit
            )));
        }
        Ok(self.action_log_repo.find_recent(limit)?)
    }
}

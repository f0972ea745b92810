// ==========================================
// 纺织生产追溯系统 - API 层公共工具
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::{TraceConfigReader, TraceSettings};
use crate::engine::enrichment::EnrichmentPipeline;

/// 读取当前配置快照（每个请求读取一次）
pub(crate) async fn load_settings(config: &dyn TraceConfigReader) -> ApiResult<TraceSettings> {
    config
        .load_settings()
        .await
        .map_err(|e| ApiError::InternalError(format!("配置读取失败: {}", e)))
}

/// 按配置的并发上限派生本次请求使用的管线
pub(crate) fn scoped_pipeline(
    pipeline: &EnrichmentPipeline,
    settings: &TraceSettings,
) -> EnrichmentPipeline {
    pipeline
        .clone()
        .with_max_concurrency(settings.enrichment_max_concurrency)
}

pub(crate) fn not_found(entity: &str, id: &str) -> ApiError {
    ApiError::NotFound(format!("{}(id={})不存在", entity, id))
}

/// 非空字符串校验（返回去空格后的值）
pub(crate) fn require_text(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::ValidationError(format!("{}不能为空", field)));
    }
    Ok(trimmed.to_string())
}

/// 正数校验
pub(crate) fn require_positive(value: f64, field: &str) -> ApiResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ApiError::ValidationError(format!(
            "{}必须大于 0: {}",
            field, value
        )));
    }
    Ok(())
}

// ==========================================
// 纺织生产追溯系统 - 操作日志数据仓储
// ==========================================
// 红线: 所有写入必须记录；业务写入通过 insert_tx 与变更同事务提交
// ==========================================

mod core;
mod queries;

#[cfg(test)]
mod tests;

pub use core::ActionLogRepository;

// ==========================================
// 纺织生产追溯系统 - 织机名册映射
// ==========================================
// 列: company_name / loom_name / status(可选, 默认 IDLE)
// 名册只允许导入 IDLE / MAINTENANCE，BUSY 由经轴占用产生
// ==========================================

use crate::domain::types::LoomStatus;
use crate::importer::file_parser::RawRow;
use serde::Serialize;

const COMPANY_COLUMNS: &[&str] = &["company_name", "company", "unit", "公司"];
const LOOM_COLUMNS: &[&str] = &["loom_name", "loom", "name", "织机"];
const STATUS_COLUMNS: &[&str] = &["status", "状态"];

#[derive(Debug, Clone, PartialEq)]
pub struct LoomRosterRow {
    pub row: usize,
    pub company_name: String,
    pub loom_name: String,
    pub status: LoomStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowIssue {
    pub row: usize,
    pub message: String,
}

/// 映射原始行，返回 (有效行, 问题行)
pub fn map_rows(rows: &[RawRow]) -> (Vec<LoomRosterRow>, Vec<RowIssue>) {
    let mut valid = Vec::new();
    let mut issues = Vec::new();

    for raw in rows {
        let company = raw.first_of(COMPANY_COLUMNS);
        let loom = raw.first_of(LOOM_COLUMNS);
        let (company, loom) = match (company, loom) {
            (Some(c), Some(l)) => (c, l),
            _ => {
                issues.push(RowIssue {
                    row: raw.row,
                    message: "公司名或织机名为空".to_string(),
                });
                continue;
            }
        };

        let status = match raw.first_of(STATUS_COLUMNS) {
            None => LoomStatus::Idle,
            Some(s) => match LoomStatus::from_db_str(s) {
                Some(LoomStatus::Busy) | None => {
                    issues.push(RowIssue {
                        row: raw.row,
                        message: format!("无效的织机状态: {}", s),
                    });
                    continue;
                }
                Some(status) => status,
            },
        };

        valid.push(LoomRosterRow {
            row: raw.row,
            company_name: company.to_string(),
            loom_name: loom.to_string(),
            status,
        });
    }

    (valid, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::file_parser::CsvParser;

    #[test]
    fn test_map_rows_collects_issues() {
        let data = "company,loom,status\nUnit A,L-01,\nUnit A,L-02,maintenance\n,L-03,\nUnit B,L-04,BUSY\n";
        let rows = CsvParser::parse_reader(data.as_bytes()).unwrap();
        let (valid, issues) = map_rows(&rows);

        assert_eq!(valid.len(), 2);
        assert_eq!(valid[0].status, LoomStatus::Idle);
        assert_eq!(valid[1].status, LoomStatus::Maintenance);
        assert_eq!(
            issues.iter().map(|i| i.row).collect::<Vec<_>>(),
            vec![3, 4]
        );
    }
}

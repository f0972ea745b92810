// ==========================================
// 纺织生产追溯系统 - 验布记录仓储
// ==========================================
// 以布号为键；分匹时与父布匹同事务删除
// ==========================================

use crate::domain::fabric_cut::InspectionRecord;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

pub struct InspectionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl InspectionRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn map_row(row: &Row) -> rusqlite::Result<InspectionRecord> {
        Ok(InspectionRecord {
            inspection_id: row.get(0)?,
            fabric_number: row.get(1)?,
            fabric_cut_id: row.get(2)?,
            inspector: row.get(3)?,
            result: row.get(4)?,
            remarks: row.get(5)?,
            inspected_at: row.get(6)?,
        })
    }

    pub fn insert_tx(conn: &Connection, record: &InspectionRecord) -> RepositoryResult<()> {
        conn.execute(
            r#"INSERT INTO inspection_records (
                inspection_id, fabric_number, fabric_cut_id, inspector, result, remarks, inspected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                record.inspection_id,
                record.fabric_number,
                record.fabric_cut_id,
                record.inspector,
                record.result,
                record.remarks,
                record.inspected_at,
            ],
        )?;
        Ok(())
    }

    /// 删除该布号的全部验布记录，返回删除条数
    pub fn delete_by_fabric_number_tx(conn: &Connection, fabric_number: &str) -> RepositoryResult<usize> {
        let rows = conn.execute(
            "DELETE FROM inspection_records WHERE fabric_number = ?1",
            params![fabric_number],
        )?;
        Ok(rows)
    }

    pub fn find_by_fabric_number(&self, fabric_number: &str) -> RepositoryResult<Vec<InspectionRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let mut stmt = conn.prepare(
            r#"SELECT inspection_id, fabric_number, fabric_cut_id, inspector, result, remarks, inspected_at
               FROM inspection_records WHERE fabric_number = ?1
               ORDER BY inspected_at ASC"#,
        )?;
        let records = stmt
            .query_map(params![fabric_number], Self::map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use chrono::Utc;

    fn record(id: &str, fabric_number: &str) -> InspectionRecord {
        InspectionRecord {
            inspection_id: id.to_string(),
            fabric_number: fabric_number.to_string(),
            fabric_cut_id: "c1".to_string(),
            inspector: "ravi".to_string(),
            result: "PASS".to_string(),
            remarks: None,
            inspected_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn test_delete_by_fabric_number() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        InspectionRepository::insert_tx(&conn, &record("i1", "W5-03")).unwrap();
        InspectionRepository::insert_tx(&conn, &record("i2", "W5-03")).unwrap();
        InspectionRepository::insert_tx(&conn, &record("i3", "W5-04")).unwrap();

        let conn = Arc::new(Mutex::new(conn));
        let repo = InspectionRepository::new(conn.clone());
        assert_eq!(repo.find_by_fabric_number("W5-03").unwrap().len(), 2);

        let deleted =
            InspectionRepository::delete_by_fabric_number_tx(&conn.lock().unwrap(), "W5-03").unwrap();
        assert_eq!(deleted, 2);
        assert!(repo.find_by_fabric_number("W5-03").unwrap().is_empty());
        assert_eq!(repo.find_by_fabric_number("W5-04").unwrap().len(), 1);
    }
}

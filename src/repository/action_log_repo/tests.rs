use super::ActionLogRepository;
use crate::domain::action_log::{ActionLog, ActionType};
use chrono::{Duration, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::init_schema(&conn).unwrap();
    Arc::new(Mutex::new(conn))
}

fn insert_log(repo: &ActionLogRepository, log: &ActionLog) -> String {
    let conn = repo.get_conn().unwrap();
    ActionLogRepository::insert_tx(&conn, log).unwrap()
}

fn make_test_log(action_type: ActionType, target_id: &str, order_id: Option<&str>, minutes: i64) -> ActionLog {
    let mut log = ActionLog::new(
        action_type,
        "tester",
        target_id,
        order_id,
        Some(json!({ "quantity": 100.0 })),
        "test",
    );
    log.action_ts = Utc::now().naive_utc() + Duration::minutes(minutes);
    log
}

#[test]
fn test_insert_and_find_by_id() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn);

    let log = make_test_log(ActionType::CreateWarp, "w1", Some("o1"), 0);
    let id = insert_log(&repo, &log);
    assert_eq!(id, log.action_id);

    let found = repo.find_by_id(&id).unwrap().unwrap();
    assert_eq!(found.action_type, "CREATE_WARP");
    assert_eq!(found.target_kind, "WARP");
    assert_eq!(found.order_id.as_deref(), Some("o1"));
    assert_eq!(found.payload_json, Some(json!({ "quantity": 100.0 })));
}

#[test]
fn test_find_by_order_is_chronological() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn);

    insert_log(&repo, &make_test_log(ActionType::StopWarp, "w1", Some("o1"), 10));
    insert_log(&repo, &make_test_log(ActionType::CreateWarp, "w1", Some("o1"), 0));
    insert_log(&repo, &make_test_log(ActionType::CreateLoom, "l1", None, 5));

    let logs = repo.find_by_order("o1").unwrap();
    assert_eq!(
        logs.iter().map(|l| l.action_type.as_str()).collect::<Vec<_>>(),
        vec!["CREATE_WARP", "STOP_WARP"]
    );
    assert_eq!(repo.find_by_target("WARP", "w1").unwrap().len(), 2);
    assert_eq!(repo.find_by_target("LOOM", "l1").unwrap().len(), 1);
}

#[test]
fn test_find_recent_and_count() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn);

    for i in 0..5 {
        insert_log(&repo, &make_test_log(ActionType::CreateFabricCuts, "w1", Some("o1"), i));
    }

    let recent = repo.find_recent(3).unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent[0].action_ts >= recent[1].action_ts);
    assert_eq!(repo.count_by_action_type("CREATE_FABRIC_CUTS").unwrap(), 5);
}

#[test]
fn test_insert_tx_rolls_back_with_transaction() {
    let conn = setup_test_db();
    let repo = ActionLogRepository::new(conn.clone());
    let log = make_test_log(ActionType::SplitFabricCut, "c1", Some("o1"), 0);

    {
        let mut c = conn.lock().unwrap();
        let tx = c.transaction().unwrap();
        ActionLogRepository::insert_tx(&tx, &log).unwrap();
        // 未提交即 drop
    }

    assert!(repo.find_by_id(&log.action_id).unwrap().is_none());
}

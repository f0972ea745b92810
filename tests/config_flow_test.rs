// ==========================================
// 运行配置集成测试
// ==========================================
// 职责: 配置覆写校验、取值边界、覆写与日志同事务
// ==========================================


#[cfg(test)]
mod config_flow_test {
    use rusqlite::{params, Connection};
    use textile_trace::api::ApiError;
    use textile_trace::config::config_keys;
    use textile_trace::{LoomReassignPolicy, RuleViolation};

    use crate::test_helpers::*;

    /// 绕过 API 直接写 config_kv（模拟手工改库）
    fn write_raw_config(state: &textile_trace::app::AppState, key: &str, value: &str) {
        let conn = Connection::open(&state.db_path).unwrap();
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_split_tolerance_cannot_be_loosened() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[30.0], ACTOR)
            .unwrap();
        let parent_id = &cuts[0].fabric_cut_id;

        let err = state
            .config_api
            .update_config(config_keys::SPLIT_QUANTITY_TOLERANCE, "1", ACTOR)
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));

        // 库内被改成宽松值时读取端仍按 0.01 截断
        write_raw_config(&state, config_keys::SPLIT_QUANTITY_TOLERANCE, "1");
        let settings = state.config_api.get_settings().await.unwrap();
        assert_eq!(settings.split_quantity_tolerance, 0.01);

        let err = state
            .fabric_cut_api
            .split_fabric_cut(parent_id, &[15.0, 14.5], ACTOR)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rule(RuleViolation::QuantityMismatch(_))
        ));
        assert_eq!(state.fabric_cut_api.get_fabric_cut(parent_id).unwrap().quantity, 30.0);
    }

    #[tokio::test]
    async fn test_config_update_writes_value_and_log_together() {
        let (_tmp, state) = setup_state();

        state
            .config_api
            .update_config(config_keys::LOOM_REASSIGN_POLICY, " legacy ", ACTOR)
            .unwrap();
        let settings = state.config_api.get_settings().await.unwrap();
        assert_eq!(settings.loom_reassign_policy, LoomReassignPolicy::Legacy);

        let logs = state
            .action_log_api
            .list_by_target("config", config_keys::LOOM_REASSIGN_POLICY)
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, "UPDATE_CONFIG");
        let payload = logs[0].payload_json.as_ref().unwrap();
        assert!(payload["from"].is_null());
        assert_eq!(payload["to"], "LEGACY");

        // 校验失败：值不变、不写日志
        assert!(state
            .config_api
            .update_config(config_keys::LOOM_REASSIGN_POLICY, "sometimes", ACTOR)
            .is_err());
        let logs = state
            .action_log_api
            .list_by_target("CONFIG", config_keys::LOOM_REASSIGN_POLICY)
            .unwrap();
        assert_eq!(logs.len(), 1);
        let settings = state.config_api.get_settings().await.unwrap();
        assert_eq!(settings.loom_reassign_policy, LoomReassignPolicy::Legacy);
    }

    #[tokio::test]
    async fn test_low_filter_cap_in_store_still_resolves_sub_cuts() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[20.0], ACTOR)
            .unwrap();
        let children = state
            .fabric_cut_api
            .split_fabric_cut(&cuts[0].fabric_cut_id, &[10.0, 10.0], ACTOR)
            .await
            .unwrap();

        write_raw_config(&state, config_keys::MEMBERSHIP_FILTER_CAP, "5");
        let settings = state.config_api.get_settings().await.unwrap();
        assert_eq!(settings.membership_filter_cap, 8);

        let view = state
            .fabric_cut_api
            .lookup_by_scan_code(&format!("{}/1/2", warp.warp_code))
            .await
            .unwrap();
        assert_eq!(view.cut.fabric_cut_id, children[1].fabric_cut_id);
    }
}

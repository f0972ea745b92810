// ==========================================
// 布匹扫码与分匹流程测试
// ==========================================
// 职责: 验证匹号生成、多格式扫码、分匹守恒、验布交接
// ==========================================


#[cfg(test)]
mod fabric_cut_flow_test {
    use textile_trace::api::{ApiError, RecordInspectionRequest};
    use textile_trace::engine::{FabricCutQuery, FabricCutSort};
    use textile_trace::RuleViolation;

    use crate::test_helpers::*;

    #[tokio::test]
    async fn test_cut_numbers_continue_per_warp() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;

        let first = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[10.0, 20.0], ACTOR)
            .unwrap();
        let second = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[30.0], ACTOR)
            .unwrap();

        let code = &warp.warp_code;
        assert_eq!(cut_numbers(&first), vec![format!("{}-01", code), format!("{}-02", code)]);
        assert_eq!(cut_numbers(&second), vec![format!("{}-03", code)]);
        assert_eq!(second[0].scan_code, format!("{}/03", code));
        assert_eq!(second[0].loom_snapshot, warp.loom_snapshot);
    }

    #[tokio::test]
    async fn test_scan_code_spellings_resolve_to_same_cut() {
        let (_tmp, state) = setup_state();
        let (order, loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[12.5], ACTOR)
            .unwrap();

        let code = &warp.warp_code;
        for scanned in [
            format!("{}/01", code),
            format!("{}-01", code),
            format!("{}/1", code),
            format!("{}-1", code),
        ] {
            let view = state.fabric_cut_api.lookup_by_scan_code(&scanned).await.unwrap();
            assert_eq!(view.cut.fabric_cut_id, cuts[0].fabric_cut_id, "scanned={}", scanned);
            assert_eq!(view.warp_code.as_deref(), Some(code.as_str()));
            assert_eq!(view.order.as_ref().map(|o| o.order_id.as_str()), Some(order.order_id.as_str()));
            let loom_ref = view.loom.unwrap();
            assert_eq!(loom_ref.loom_id, loom.loom_id);
            assert!(!loom_ref.from_snapshot);
        }

        let err = state
            .fabric_cut_api
            .lookup_by_scan_code(&format!("{}/02", code))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        assert_eq!(err.http_status(), 404);

        let err = state.fabric_cut_api.lookup_by_scan_code("W1/xx").await.unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_split_into_three_and_parent_disappears() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[10.0, 20.0, 30.0], ACTOR)
            .unwrap();
        let parent = &cuts[2];
        let code = &warp.warp_code;
        assert_eq!(parent.fabric_number, format!("{}-03", code));

        let children = state
            .fabric_cut_api
            .split_fabric_cut(&parent.fabric_cut_id, &[10.0, 10.0, 10.0], ACTOR)
            .await
            .unwrap();
        assert_eq!(
            cut_numbers(&children),
            vec![
                format!("{}-03/01", code),
                format!("{}-03/02", code),
                format!("{}-03/03", code),
            ]
        );
        assert_eq!(children[1].scan_code, format!("{}/03/02", code));
        assert!(children.iter().all(|c| c.parent_fabric_id.as_deref() == Some(parent.fabric_cut_id.as_str())));
        let total: f64 = children.iter().map(|c| c.quantity).sum();
        assert!((total - parent.quantity).abs() < 0.01);

        // 父匹扫码 → 404
        let err = state
            .fabric_cut_api
            .lookup_by_scan_code(&format!("{}/03", code))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        // 子匹多种写法均可识别
        for scanned in [format!("{}/03/02", code), format!("{}-03/2", code), format!("{}/3/02", code)] {
            let view = state.fabric_cut_api.lookup_by_scan_code(&scanned).await.unwrap();
            assert_eq!(view.cut.fabric_cut_id, children[1].fabric_cut_id, "scanned={}", scanned);
        }

        // 重放 → NotFound
        let err = state
            .fabric_cut_api
            .split_fabric_cut(&parent.fabric_cut_id, &[10.0, 10.0, 10.0], ACTOR)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        // 分匹后新裁剪的匹号不与子匹冲突
        let next = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[5.0], ACTOR)
            .unwrap();
        assert_eq!(next[0].fabric_number, format!("{}-04", code));
    }

    #[tokio::test]
    async fn test_split_quantity_mismatch_leaves_parent_intact() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[30.0], ACTOR)
            .unwrap();
        let parent_id = &cuts[0].fabric_cut_id;

        for quantities in [vec![30.0], vec![10.0, 10.0], vec![40.0, -10.0], vec![15.0, 14.98]] {
            let err = state
                .fabric_cut_api
                .split_fabric_cut(parent_id, &quantities, ACTOR)
                .await
                .unwrap_err();
            assert!(
                matches!(err, ApiError::Rule(RuleViolation::QuantityMismatch(_))),
                "quantities={:?}",
                quantities
            );
        }
        assert!(state.fabric_cut_api.get_fabric_cut(parent_id).is_ok());

        // 容差内通过
        let children = state
            .fabric_cut_api
            .split_fabric_cut(parent_id, &[15.0, 14.995], ACTOR)
            .await
            .unwrap();
        assert_eq!(children.len(), 2);

        // 子匹不能再分
        let err = state
            .fabric_cut_api
            .split_fabric_cut(&children[0].fabric_cut_id, &[7.5, 7.5], ACTOR)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_inspection_handoff_and_already_inspected() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[25.0, 25.0], ACTOR)
            .unwrap();
        let code = &warp.warp_code;

        let arrived = state
            .fabric_cut_api
            .receive_at_inspection(&format!("{}-1", code), ACTOR)
            .await
            .unwrap();
        let first_arrival = arrived.cut.inspection_arrived_at.unwrap();

        // 重复到达扫码保留首次时间
        let again = state
            .fabric_cut_api
            .receive_at_inspection(&format!("{}/01", code), ACTOR)
            .await
            .unwrap();
        assert_eq!(again.cut.inspection_arrived_at, Some(first_arrival));

        let awaiting = state
            .fabric_cut_api
            .list_fabric_cuts(&FabricCutQuery {
                awaiting_inspection: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(awaiting.len(), 1);

        let record = state
            .fabric_cut_api
            .record_inspection(
                RecordInspectionRequest {
                    fabric_cut_id: cuts[0].fabric_cut_id.clone(),
                    inspector: "Inspector 1".to_string(),
                    result: "A".to_string(),
                    remarks: None,
                },
                ACTOR,
            )
            .unwrap();
        assert_eq!(record.fabric_number, cuts[0].fabric_number);

        let err = state
            .fabric_cut_api
            .lookup_by_scan_code(&format!("{}/01", code))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rule(RuleViolation::AlreadyInspected { .. })
        ));
        assert_eq!(err.code(), "ALREADY_INSPECTED");

        let err = state
            .fabric_cut_api
            .receive_at_inspection(&format!("{}/01", code), ACTOR)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ALREADY_INSPECTED");
    }

    #[tokio::test]
    async fn test_split_removes_parent_inspection_records() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[20.0], ACTOR)
            .unwrap();
        let parent = &cuts[0];

        state
            .fabric_cut_api
            .record_inspection(
                RecordInspectionRequest {
                    fabric_cut_id: parent.fabric_cut_id.clone(),
                    inspector: "Inspector 2".to_string(),
                    result: "B".to_string(),
                    remarks: Some("edge fault".to_string()),
                },
                ACTOR,
            )
            .unwrap();
        assert_eq!(
            state.fabric_cut_api.list_inspections(&parent.fabric_number).unwrap().len(),
            1
        );

        let children = state
            .fabric_cut_api
            .split_fabric_cut(&parent.fabric_cut_id, &[12.0, 8.0], ACTOR)
            .await
            .unwrap();
        assert!(state
            .fabric_cut_api
            .list_inspections(&parent.fabric_number)
            .unwrap()
            .is_empty());
        assert!(children.iter().all(|c| !c.inspected && c.inspection_arrived_at.is_none()));

        let logs = state
            .action_log_api
            .list_by_target("FABRIC_CUT", &parent.fabric_cut_id)
            .unwrap();
        let types: Vec<&str> = logs.iter().map(|l| l.action_type.as_str()).collect();
        assert_eq!(types, vec!["SPLIT_FABRIC_CUT", "RECORD_INSPECTION"]);
    }

    #[tokio::test]
    async fn test_cuts_require_active_warp() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        complete_warp(&state, &warp.warp_id).await.unwrap();

        let err = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[10.0], ACTOR)
            .unwrap_err();
        assert!(matches!(
            err,
            ApiError::Rule(RuleViolation::InvalidStateTransition { .. })
        ));

        let err = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[], ACTOR)
            .unwrap_err();
        assert!(matches!(err, ApiError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_list_fabric_cuts_sorted_by_fabric_number() {
        let (_tmp, state) = setup_state();
        let (_order, _loom, warp) = setup_active_warp(&state, 500.0).await;
        let cuts = state
            .fabric_cut_api
            .create_fabric_cuts(&warp.warp_id, &[10.0, 10.0, 10.0], ACTOR)
            .unwrap();
        state
            .fabric_cut_api
            .split_fabric_cut(&cuts[1].fabric_cut_id, &[5.0, 5.0], ACTOR)
            .await
            .unwrap();

        let views = state
            .fabric_cut_api
            .list_fabric_cuts(&FabricCutQuery {
                warp_id: Some(warp.warp_id.clone()),
                sort: FabricCutSort::FabricNumber,
                ..Default::default()
            })
            .await
            .unwrap();
        let code = &warp.warp_code;
        let numbers: Vec<String> = views.iter().map(|v| v.cut.fabric_number.clone()).collect();
        assert_eq!(
            numbers,
            vec![
                format!("{}-01", code),
                format!("{}-02/01", code),
                format!("{}-02/02", code),
                format!("{}-03", code),
            ]
        );
    }
}

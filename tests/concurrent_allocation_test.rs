// ==========================================
// 并发分配测试
// ==========================================
// 职责: 多连接并发分配时不得超出整经量
// ==========================================


#[cfg(test)]
mod concurrent_allocation_test {
    use std::sync::Arc;
    use std::thread;

    use textile_trace::api::ApiError;
    use textile_trace::app::AppState;
    use textile_trace::RuleViolation;

    use crate::test_helpers::*;

    #[test]
    fn test_concurrent_allocations_never_over_allocate() {
        let (_tmp, state_a) = setup_state();
        // 第二个 AppState = 第二条独立连接
        let state_b = AppState::new(state_a.db_path.clone()).unwrap();

        let order = create_order(&state_a, 1000.0, 1100.0);
        let looms: Vec<String> = (1..=6)
            .map(|i| create_loom(&state_a, "Unit A", &format!("L-{:02}", i)).loom_id)
            .collect();

        let states = [Arc::new(state_a), Arc::new(state_b)];
        let handles: Vec<_> = looms
            .into_iter()
            .enumerate()
            .map(|(i, loom_id)| {
                let state = states[i % 2].clone();
                let order_id = order.order_id.clone();
                thread::spawn(move || {
                    let rt = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                        .unwrap();
                    rt.block_on(create_warp(&state, &order_id, &loom_id, 300.0))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| {
                matches!(
                    r,
                    Err(ApiError::Rule(RuleViolation::InsufficientQuantity { .. }))
                )
            })
            .count();

        assert_eq!(succeeded, 3, "results={:?}", results);
        assert_eq!(insufficient, 3, "results={:?}", results);

        let summary = states[0].order_api.allocation_summary(&order.order_id).unwrap();
        assert_eq!(summary.allocated_quantity, 900.0);
        assert_eq!(summary.available_quantity, 200.0);
        assert!(summary.allocated_quantity - summary.freed_quantity <= summary.warping_quantity);

        // 经轴编号全局唯一
        let mut codes: Vec<String> = results
            .into_iter()
            .filter_map(Result::ok)
            .map(|w| w.warp_code)
            .collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 3);
    }
}

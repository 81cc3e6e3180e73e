mod common;

use common::Harness;
use rust_decimal_macros::dec;
use stockledger_core::{AlertSeverity, AlertStatus, AlertType, ValuationMethod};

#[tokio::test]
async fn alert_lifecycle_follows_aggregate_stock() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(10)).await;

    harness.receive(&item, "main", dec!(12), dec!(3)).await;
    assert!(harness.engine.active_alert(item.id).await.unwrap().is_none());

    harness.issue(&item, "main", dec!(4)).await;
    let low = harness.engine.active_alert(item.id).await.unwrap().unwrap();
    assert_eq!(low.alert_type, AlertType::LowStock);
    assert_eq!(low.severity, AlertSeverity::Medium);
    assert_eq!(low.current_stock, dec!(8));
    assert_eq!(low.warehouse.as_deref(), Some("main"));

    harness.issue(&item, "main", dec!(8)).await;
    let out = harness.engine.active_alert(item.id).await.unwrap().unwrap();
    assert_eq!(out.id, low.id);
    assert_eq!(out.alert_type, AlertType::OutOfStock);
    assert_eq!(out.severity, AlertSeverity::Critical);
    assert_eq!(out.current_stock, dec!(0));

    harness.receive(&item, "main", dec!(15), dec!(3)).await;
    assert!(harness.engine.active_alert(item.id).await.unwrap().is_none());

    let history = harness.engine.alert_history(item.id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AlertStatus::Resolved);
    assert!(history[0].resolution.is_some());
    assert!(history[0].resolved_at.is_some());

    let aggregate = harness.items.aggregate(item.id).await.unwrap();
    assert_eq!(aggregate.quantity, dec!(15));
    assert!(!aggregate.is_low_stock);
}

#[tokio::test]
async fn alerts_use_the_total_across_warehouses() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(10)).await;

    harness.receive(&item, "main", dec!(6), dec!(1)).await;
    assert!(harness.engine.active_alert(item.id).await.unwrap().is_some());

    harness.receive(&item, "branch", dec!(6), dec!(1)).await;
    assert!(harness.engine.active_alert(item.id).await.unwrap().is_none());
}

#[tokio::test]
async fn recheck_after_min_stock_change() {
    let harness = Harness::new();
    let mut item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(5), dec!(1)).await;
    assert!(harness.engine.active_alert(item.id).await.unwrap().is_none());

    item.min_stock = dec!(8);
    harness.items.upsert_item(item.clone()).await;
    let alert = harness
        .engine
        .recheck_alerts_for_item(item.id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(alert.alert_type, AlertType::LowStock);
    assert_eq!(alert.min_stock, dec!(8));
    assert!(harness.items.aggregate(item.id).await.unwrap().is_low_stock);
}

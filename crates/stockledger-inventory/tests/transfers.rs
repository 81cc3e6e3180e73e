mod common;

use common::{Harness, hours_ago};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use stockledger_core::{
    ActorContext, DocumentType, ItemProfile, NewTransfer, NewTransferLine, StockError,
    TransferAction, TransferMode, TransferStatus, ValuationMethod,
};
use stockledger_inventory::NewLedgerEntry;

fn transfer_of(lines: &[(&ItemProfile, Decimal)], mode: TransferMode) -> NewTransfer {
    NewTransfer {
        from_warehouse: "main".to_string(),
        to_warehouse: "branch".to_string(),
        items: lines
            .iter()
            .map(|(item, quantity)| NewTransferLine {
                item_id: item.id,
                quantity: *quantity,
                unit_price: None,
            })
            .collect(),
        mode,
        transfer_ref: None,
        notes: None,
        draft: false,
    }
}

fn actor() -> ActorContext {
    ActorContext::new("warehouse-lead")
}

#[tokio::test]
async fn create_numbers_transfers_sequentially() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;

    let first = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(1))], TransferMode::Simple), &actor())
        .await
        .unwrap();
    let second = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(1))], TransferMode::Simple), &actor())
        .await
        .unwrap();

    assert_eq!(first.transfer_number, "TRF-000001");
    assert_eq!(second.transfer_number, "TRF-000002");
    assert_eq!(first.status, TransferStatus::Pending);
    assert_eq!(first.created_by.as_deref(), Some("warehouse-lead"));
}

#[tokio::test]
async fn create_rejects_unknown_items() {
    let harness = Harness::new();
    let mut ghost = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    ghost.id = uuid::Uuid::new_v4();

    let err = harness
        .engine
        .create_transfer(transfer_of(&[(&ghost, dec!(1))], TransferMode::Simple), &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::NotFound { .. }));
}

#[tokio::test]
async fn simple_transfer_moves_value_at_source_average_cost() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;
    harness.receive(&item, "main", dec!(10), dec!(20)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(4))], TransferMode::Simple), &actor())
        .await
        .unwrap();
    let approved = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();

    assert_eq!(approved.status, TransferStatus::Completed);
    assert_eq!(approved.items[0].unit_price, dec!(15));
    assert_eq!(approved.approved_by.as_deref(), Some("warehouse-lead"));
    assert_eq!(harness.stock(&item, "main").await, (dec!(16), dec!(240)));
    assert_eq!(harness.stock(&item, "branch").await, (dec!(4), dec!(60)));

    let aggregate = harness.items.aggregate(item.id).await.unwrap();
    assert_eq!(aggregate.quantity, dec!(20));
    assert_eq!(aggregate.value, dec!(300));

    let history = harness.engine.ledger_history(item.id).await.unwrap();
    let legs: Vec<_> = history
        .iter()
        .filter(|entry| entry.document_type.is_transfer())
        .collect();
    assert_eq!(legs.len(), 2);
    assert!(legs
        .iter()
        .all(|entry| entry.reference.as_deref() == Some(transfer.transfer_ref.as_str())));
}

#[tokio::test]
async fn simple_fifo_transfer_carries_layers_to_destination() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::Fifo, dec!(0)).await;
    for (quantity, price, age) in [(dec!(5), dec!(10), 3), (dec!(5), dec!(20), 2)] {
        harness
            .engine
            .append_ledger_entry(NewLedgerEntry::receipt(item.id, "main", quantity, price).at(hours_ago(age)))
            .await
            .unwrap();
    }

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(7))], TransferMode::Simple), &actor())
        .await
        .unwrap();
    harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();

    assert_eq!(harness.stock(&item, "main").await, (dec!(3), dec!(60)));
    assert_eq!(harness.stock(&item, "branch").await, (dec!(7), dec!(90)));

    let valuation = harness.engine.item_valuation(item.id).await.unwrap();
    let mut branch_layers: Vec<(Decimal, Decimal)> = valuation
        .open_layers
        .iter()
        .filter(|layer| layer.warehouse == "branch")
        .map(|layer| (layer.remaining_quantity, layer.unit_price))
        .collect();
    branch_layers.sort();
    assert_eq!(branch_layers, vec![(dec!(2), dec!(20)), (dec!(5), dec!(10))]);

    let report = harness.engine.reconcile_item(item.id).await.unwrap();
    assert_eq!(report.entries_rewritten, 0);
    assert_eq!(report.final_value, dec!(150));
}

#[tokio::test]
async fn two_stage_transfer_books_destination_on_receive() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(6))], TransferMode::TwoStage), &actor())
        .await
        .unwrap();
    let in_transit = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();

    assert_eq!(in_transit.status, TransferStatus::InTransit);
    assert_eq!(in_transit.in_transit.get(&item.id), Some(&dec!(6)));
    assert_eq!(harness.stock(&item, "main").await.0, dec!(4));
    assert_eq!(harness.stock(&item, "branch").await.0, dec!(0));

    // the source cost moves after dispatch; the receipt still uses the recorded cost
    harness.receive(&item, "main", dec!(10), dec!(40)).await;

    let received = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Receive, &actor())
        .await
        .unwrap();

    assert_eq!(received.status, TransferStatus::Completed);
    assert!(received.in_transit.is_empty());
    assert_eq!(harness.stock(&item, "branch").await, (dec!(6), dec!(60)));
    assert_eq!(harness.engine.transfer(transfer.id).await.unwrap(), received);
}

#[tokio::test]
async fn receive_is_rejected_for_simple_transfers() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(1))], TransferMode::Simple), &actor())
        .await
        .unwrap();
    let err = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Receive, &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::State(_)));
}

#[tokio::test]
async fn cancel_is_allowed_until_completion() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let mut draft_input = transfer_of(&[(&item, dec!(1))], TransferMode::Simple);
    draft_input.draft = true;
    let draft = harness.engine.create_transfer(draft_input, &actor()).await.unwrap();
    assert_eq!(draft.status, TransferStatus::Draft);
    let cancelled = harness
        .engine
        .execute_transfer_action(draft.id, TransferAction::Cancel, &actor())
        .await
        .unwrap();
    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.cancelled_at.is_some());

    let again = harness
        .engine
        .execute_transfer_action(draft.id, TransferAction::Cancel, &actor())
        .await
        .unwrap_err();
    assert!(matches!(again, StockError::State(_)));

    let completed = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(2))], TransferMode::Simple), &actor())
        .await
        .unwrap();
    harness
        .engine
        .execute_transfer_action(completed.id, TransferAction::Approve, &actor())
        .await
        .unwrap();
    let err = harness
        .engine
        .execute_transfer_action(completed.id, TransferAction::Cancel, &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::State(_)));
    assert_eq!(harness.stock(&item, "main").await.0, dec!(8));
}

#[tokio::test]
async fn cancelling_in_transit_returns_stock_to_source() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::Fifo, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(6))], TransferMode::TwoStage), &actor())
        .await
        .unwrap();
    harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();
    assert_eq!(harness.stock(&item, "main").await, (dec!(4), dec!(40)));

    let cancelled = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Cancel, &actor())
        .await
        .unwrap();

    assert_eq!(cancelled.status, TransferStatus::Cancelled);
    assert!(cancelled.in_transit.is_empty());
    assert_eq!(harness.stock(&item, "main").await, (dec!(10), dec!(100)));
    assert_eq!(harness.stock(&item, "branch").await.0, dec!(0));
}

#[tokio::test]
async fn approval_checks_every_line_before_writing() {
    let harness = Harness::new();
    let stocked = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    let short = harness.item(ValuationMethod::Fifo, dec!(0)).await;
    harness.receive(&stocked, "main", dec!(10), dec!(10)).await;
    harness.receive(&short, "main", dec!(2), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(
            transfer_of(&[(&stocked, dec!(5)), (&short, dec!(3))], TransferMode::Simple),
            &actor(),
        )
        .await
        .unwrap();
    let err = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap_err();

    assert!(matches!(err, StockError::Consistency(_)));
    assert_eq!(harness.engine.ledger_history(stocked.id).await.unwrap().len(), 1);
    assert_eq!(
        harness.engine.transfer(transfer.id).await.unwrap().status,
        TransferStatus::Pending
    );
}

#[tokio::test]
async fn retried_approval_skips_legs_already_posted() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(4))], TransferMode::Simple), &actor())
        .await
        .unwrap();

    // source leg of an earlier attempt that stopped halfway
    let mut source_leg = NewLedgerEntry::new(item.id, "main", DocumentType::TransferOut)
        .with_reference(transfer.transfer_ref.clone());
    source_leg.quantity_out = dec!(4);
    harness.engine.append_ledger_entry(source_leg).await.unwrap();

    let approved = harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();

    assert_eq!(approved.status, TransferStatus::Completed);
    assert_eq!(harness.stock(&item, "main").await, (dec!(6), dec!(60)));
    assert_eq!(harness.stock(&item, "branch").await, (dec!(4), dec!(40)));
    assert_eq!(harness.engine.ledger_history(item.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn transfer_actions_are_audited() {
    let harness = Harness::new();
    let item = harness.item(ValuationMethod::WeightedAverage, dec!(0)).await;
    harness.receive(&item, "main", dec!(10), dec!(10)).await;

    let transfer = harness
        .engine
        .create_transfer(transfer_of(&[(&item, dec!(4))], TransferMode::TwoStage), &actor())
        .await
        .unwrap();
    harness
        .engine
        .execute_transfer_action(transfer.id, TransferAction::Approve, &actor())
        .await
        .unwrap();

    let records = harness.audit.records().await;
    let approve = records
        .iter()
        .find(|record| record.action == "transfer.approve")
        .unwrap();
    assert_eq!(approve.entity_id, transfer.id);
    assert_eq!(approve.actor.actor_id, "warehouse-lead");
    assert_eq!(approve.before.as_ref().unwrap()["status"], "pending");
    assert_eq!(approve.after.as_ref().unwrap()["status"], "in_transit");
}

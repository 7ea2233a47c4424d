//! Loan lifecycle against the in-memory store

mod common;

use chrono::Duration;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use common::Harness;
use elidune_circulation::{
    error::{AppError, ErrorCode},
    models::{CirculationStatus, CopyBucket, ItemStatus, ReservationStatus, ReturnCondition},
    repository::CirculationStore,
};

#[tokio::test]
async fn test_two_copies_three_patrons() {
    let mut h = Harness::new();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let item = h.services.registry.register_item(2).await.unwrap();

    let record_a = h.services.ledger.issue(item.id, a, 14).await.unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(record_a.status, CirculationStatus::Issued);
    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!((stock.available_copies, stock.borrowed_copies), (1, 1));

    h.services.ledger.issue(item.id, b, 14).await.unwrap();
    h.assert_balanced(item.id).await;
    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!((stock.available_copies, stock.borrowed_copies), (0, 2));

    let err = h.services.ledger.issue(item.id, c, 14).await.unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::Conflict(ErrorCode::NoCopiesAvailable, _)));

    let hold = h.services.reservations.reserve(item.id, c, 7).await.unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(hold.status, ReservationStatus::Active);

    h.set_day(20);
    let receipt = h
        .services
        .ledger
        .return_item(record_a.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(receipt.record.status, CirculationStatus::Returned);
    assert_eq!(receipt.record.fine_amount, Decimal::from_str("3.00").unwrap());

    let fulfillment = receipt.fulfillment.expect("hold should be served");
    assert_eq!(fulfillment.reservation.id, hold.id);
    assert_eq!(fulfillment.reservation.status, ReservationStatus::Completed);
    assert_eq!(fulfillment.reservation.pickup_date, Some(h.now()));
    assert_eq!(fulfillment.loan.patron_id, c);
    assert_eq!(fulfillment.loan.status, CirculationStatus::Issued);

    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!((stock.available_copies, stock.borrowed_copies), (0, 2));
    assert!(stock.is_balanced());

    let stored_hold = h.services.reservations.get_reservation(hold.id).await.unwrap();
    assert_eq!(stored_hold.loan_id, Some(fulfillment.loan.id));

    let notice = h.next_notice().await.expect("patron C should be notified");
    assert_eq!(notice.patron_id, c);
    assert_eq!(notice.loan_id, fulfillment.loan.id);
}

#[tokio::test]
async fn test_on_time_return_has_no_fine() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;

    h.set_day(14);
    let receipt = h
        .services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(receipt.record.fine_amount, Decimal::ZERO);
    assert!(receipt.fulfillment.is_none());

    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!(stock.available_copies, 1);
}

#[tokio::test]
async fn test_fine_is_capped() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;

    h.set_day(14 + 365);
    let receipt = h
        .services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(receipt.record.fine_amount, Decimal::from_str("50.00").unwrap());
}

#[tokio::test]
async fn test_return_twice_is_invalid() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;

    h.services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    let err = h
        .services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!(stock.available_copies, 1);
    assert_eq!(stock.borrowed_copies, 0);
}

#[tokio::test]
async fn test_lost_and_damaged_returns() {
    let h = Harness::new();
    let item = h.services.registry.register_item(3).await.unwrap();
    let lost = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;
    let damaged = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;

    let receipt = h
        .services
        .ledger
        .return_item(lost.id, ReturnCondition::Lost)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(receipt.record.status, CirculationStatus::Lost);

    let receipt = h
        .services
        .ledger
        .return_item(damaged.id, ReturnCondition::Damaged)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(receipt.record.status, CirculationStatus::Damaged);

    let stock = h.services.registry.get_item(item.id).await.unwrap();
    assert_eq!(stock.count(CopyBucket::Available), 1);
    assert_eq!(stock.count(CopyBucket::Lost), 1);
    assert_eq!(stock.count(CopyBucket::Damaged), 1);
    assert_eq!(stock.count(CopyBucket::Borrowed), 0);
    assert!(stock.is_balanced());
}

#[tokio::test]
async fn test_lost_copy_does_not_serve_the_queue() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;
    let hold = h
        .services
        .reservations
        .reserve(item.id, Uuid::new_v4(), 7)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;

    let receipt = h
        .services
        .ledger
        .return_item(record.id, ReturnCondition::Lost)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    assert!(receipt.fulfillment.is_none());
    let hold = h.services.reservations.get_reservation(hold.id).await.unwrap();
    assert_eq!(hold.status, ReservationStatus::Active);
}

#[tokio::test]
async fn test_extend_blocked_by_waiting_patron() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;
    h.services
        .reservations
        .reserve(item.id, Uuid::new_v4(), 7)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;

    let err = h
        .services
        .ledger
        .extend(record.id, record.due_date + Duration::days(7))
        .await
        .unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::Conflict(ErrorCode::HoldsPending, _)));

    let unchanged = h.services.ledger.get_record(record.id).await.unwrap();
    assert_eq!(unchanged.due_date, record.due_date);
}

#[tokio::test]
async fn test_extend_closed_loan_is_invalid() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;
    h.services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;

    let err = h
        .services
        .ledger
        .extend(record.id, record.due_date + Duration::days(7))
        .await
        .unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

#[tokio::test]
async fn test_duplicate_loan_refused() {
    let h = Harness::new();
    let patron = Uuid::new_v4();
    let item = h.services.registry.register_item(2).await.unwrap();
    h.services.ledger.issue(item.id, patron, 14).await.unwrap();
    h.assert_balanced(item.id).await;

    let err = h.services.ledger.issue(item.id, patron, 14).await.unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::Conflict(ErrorCode::DuplicateLoan, _)));
}

#[tokio::test]
async fn test_loan_limit_and_overdue_block_issue() {
    let h = Harness::new();
    let patron = Uuid::new_v4();
    h.patrons.set_max_loans(patron, 1);
    let first = h.services.registry.register_item(1).await.unwrap();
    let second = h.services.registry.register_item(1).await.unwrap();

    h.services.ledger.issue(first.id, patron, 14).await.unwrap();
    h.assert_balanced(first.id).await;
    h.assert_balanced(second.id).await;
    let err = h.services.ledger.issue(second.id, patron, 14).await.unwrap_err();
    h.assert_balanced(first.id).await;
    h.assert_balanced(second.id).await;
    assert!(matches!(
        err,
        AppError::PolicyViolation(ErrorCode::LoanLimitExceeded, _)
    ));

    h.patrons.set_max_loans(patron, 5);
    h.set_day(15);
    let err = h.services.ledger.issue(second.id, patron, 14).await.unwrap_err();
    h.assert_balanced(first.id).await;
    h.assert_balanced(second.id).await;
    assert!(matches!(
        err,
        AppError::PolicyViolation(ErrorCode::HasOverdueLoan, _)
    ));

    let overdue = h.services.ledger.overdue_loans().await.unwrap();
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].item_id, first.id);
}

#[tokio::test]
async fn test_inactive_item_cannot_be_issued() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    h.services
        .registry
        .set_status(item.id, ItemStatus::Maintenance)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;

    let err = h
        .services
        .ledger
        .issue(item.id, Uuid::new_v4(), 14)
        .await
        .unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::Conflict(ErrorCode::ItemInactive, _)));
}

#[tokio::test]
async fn test_retire_requires_quiet_item() {
    let h = Harness::new();
    let item = h.services.registry.register_item(1).await.unwrap();
    let record = h.services.ledger.issue(item.id, Uuid::new_v4(), 14).await.unwrap();
    h.assert_balanced(item.id).await;

    let err = h.services.registry.retire_item(item.id).await.unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(
        err,
        AppError::Conflict(ErrorCode::OutstandingCirculation, _)
    ));

    h.services
        .ledger
        .return_item(record.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    let retired = h.services.registry.retire_item(item.id).await.unwrap();
    h.assert_balanced(item.id).await;
    assert_eq!(retired.status, ItemStatus::Retired);

    let err = h
        .services
        .ledger
        .issue(item.id, Uuid::new_v4(), 14)
        .await
        .unwrap_err();
    h.assert_balanced(item.id).await;
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_patron_history_lists_all_loans() {
    let h = Harness::new();
    let patron = Uuid::new_v4();
    let item = h.services.registry.register_item(1).await.unwrap();

    let first = h.services.ledger.issue(item.id, patron, 14).await.unwrap();
    h.assert_balanced(item.id).await;
    h.services
        .ledger
        .return_item(first.id, ReturnCondition::Good)
        .await
        .unwrap();
    h.assert_balanced(item.id).await;
    h.services.ledger.issue(item.id, patron, 14).await.unwrap();
    h.assert_balanced(item.id).await;

    let loans = h.services.ledger.patron_loans(patron).await.unwrap();
    assert_eq!(loans.len(), 2);
    assert_eq!(loans.iter().filter(|r| r.is_open()).count(), 1);

    let records = h.store.all_records().unwrap();
    assert_eq!(records.len(), 2);
    let open = h.store.open_records_by_item(item.id).await.unwrap();
    assert_eq!(open.len(), 1);
}

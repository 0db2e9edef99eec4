//! End-to-end behaviour of the Coordinator against an in-memory database.

use std::str::FromStr;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use stockbook_core::{
    EventTime, Money, NewProduct, Operation, Product, ProductUpdate, RestockEvent, RestockRequest,
    Role, SaleEvent, SaleRequest, ValidationKind,
};
use stockbook_db::{CommitFailure, Coordinator, Database, DbConfig, StockError};

// =============================================================================
// Helpers
// =============================================================================

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn at(day: u32) -> EventTime {
    EventTime::new(
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap(),
    )
}

fn new_product(name: &str, price_cents: i64, quantity: i64, threshold: i64) -> NewProduct {
    NewProduct {
        name: name.to_string(),
        brand: "Acme".to_string(),
        size: "1 unit".to_string(),
        product_type: "General".to_string(),
        price: Money::from_cents(price_cents),
        quantity,
        restock_threshold: threshold,
    }
}

async fn coordinator() -> Coordinator {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    Coordinator::new(db)
}

/// A coordinator whose first product is {qty 10, threshold 5, price 9.99}.
async fn with_widget() -> (Coordinator, Product) {
    let c = coordinator().await;
    let widget = c.add_product(&new_product("Widget", 999, 10, 5)).await.unwrap();
    (c, widget)
}

#[derive(Debug, PartialEq)]
struct Snapshot {
    products: Vec<Product>,
    restocks: Vec<RestockEvent>,
    sales: Vec<SaleEvent>,
}

async fn snapshot(c: &Coordinator) -> Snapshot {
    Snapshot {
        products: c.products().await.unwrap(),
        restocks: c.restock_history().await.unwrap(),
        sales: c.sale_history().await.unwrap(),
    }
}

fn rejected_kinds(err: StockError) -> Vec<ValidationKind> {
    match err {
        StockError::Rejected(violations) => violations.kinds(),
        other => panic!("expected a rejection, got {other}"),
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn sale_reduces_stock_and_computes_change() {
    let (c, widget) = with_widget().await;

    let outcome = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 3, dec("9.99"))], dec("30.00")))
        .await
        .unwrap();

    assert_eq!(outcome.event.total.cents(), 2997);
    assert_eq!(outcome.event.payment.cents(), 3000);
    assert_eq!(outcome.event.change.cents(), 3);
    assert_eq!(outcome.products.len(), 1);
    assert_eq!(outcome.products[0].quantity, 7);
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 7);

    let line = &outcome.event.lines[0];
    assert_eq!(line.quantity, 3);
    assert_eq!(line.unit_price.cents(), 999);
    assert_eq!(line.line_total.cents(), 2997);
    assert_eq!(line.identity.name, "Widget");
    assert_eq!(c.sale_history().await.unwrap(), vec![outcome.event]);
}

#[tokio::test]
async fn oversell_is_rejected_without_changes() {
    let (c, widget) = with_widget().await;
    let before = snapshot(&c).await;

    let err = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 15, dec("9.99"))], dec("200")))
        .await
        .unwrap_err();

    assert_eq!(rejected_kinds(err), vec![ValidationKind::InsufficientStock]);
    assert_eq!(snapshot(&c).await, before);
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 10);
}

#[tokio::test]
async fn restock_increases_stock_and_records_one_event() {
    let (c, widget) = with_widget().await;
    c.apply_sale(at(7), &SaleRequest::new(&[(widget.id, 3, dec("9.99"))], dec("30")))
        .await
        .unwrap();

    let outcome = c
        .apply_restock(at(8), &RestockRequest::from_pairs(&[(widget.id, 5)]))
        .await
        .unwrap();

    assert_eq!(outcome.products[0].quantity, 12);
    let history = c.restock_history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].lines.len(), 1);
    assert_eq!(history[0].lines[0].quantity, 5);
    assert_eq!(history[0].lines[0].product_id, Some(widget.id));
    assert_eq!(history[0].lines[0].price.cents(), 999);
}

#[tokio::test]
async fn one_bad_line_rejects_the_whole_sale() {
    let (c, widget) = with_widget().await;
    let gadget = c.add_product(&new_product("Gadget", 500, 4, 1)).await.unwrap();
    let before = snapshot(&c).await;

    let err = c
        .apply_sale(
            at(7),
            &SaleRequest::new(
                &[(widget.id, 2, dec("9.99")), (gadget.id, 0, dec("5.00"))],
                dec("50"),
            ),
        )
        .await
        .unwrap_err();

    let violations = err.violations().cloned().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations.iter().next().unwrap().line, Some(1));
    assert_eq!(violations.kinds(), vec![ValidationKind::InvalidQuantity]);
    assert_eq!(snapshot(&c).await, before);
}

#[tokio::test]
async fn deleting_a_product_keeps_its_sale_history() {
    let (c, widget) = with_widget().await;
    c.apply_sale(at(7), &SaleRequest::new(&[(widget.id, 1, dec("9.99"))], dec("10")))
        .await
        .unwrap();

    c.delete_product(widget.id).await.unwrap();

    assert!(matches!(
        c.product(widget.id).await,
        Err(StockError::NotFound { .. })
    ));
    let sales = c.sale_history().await.unwrap();
    let line = &sales[0].lines[0];
    assert_eq!(line.product_id, None);
    assert_eq!(line.identity.name, "Widget");
    assert_eq!(line.identity.brand, "Acme");
    assert_eq!(line.unit_price.cents(), 999);
}

#[tokio::test]
async fn deleting_a_product_keeps_its_restock_history() {
    let (c, widget) = with_widget().await;
    c.apply_restock(at(7), &RestockRequest::from_pairs(&[(widget.id, 5)]))
        .await
        .unwrap();

    c.delete_product(widget.id).await.unwrap();

    let restocks = c.restock_history().await.unwrap();
    let line = &restocks[0].lines[0];
    assert_eq!(line.product_id, None);
    assert_eq!(line.identity.name, "Widget");
    assert_eq!(line.identity.brand, "Acme");
    assert_eq!(line.price.cents(), 999);
    assert_eq!(line.quantity, 5);
}

#[tokio::test]
async fn ledger_lines_keep_the_product_as_it_was() {
    let (c, widget) = with_widget().await;
    let restock = c
        .apply_restock(at(6), &RestockRequest::from_pairs(&[(widget.id, 2)]))
        .await
        .unwrap();
    let sale = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 1, dec("9.99"))], dec("10")))
        .await
        .unwrap();

    let mut update = ProductUpdate::from(&c.product(widget.id).await.unwrap());
    update.name = "Widget Pro".to_string();
    update.brand = "Globex".to_string();
    update.price = Money::from_cents(1499);
    c.update_product(widget.id, &update).await.unwrap();

    let sold = c.sale_event(sale.event.id).await.unwrap();
    assert_eq!(sold, sale.event);
    assert_eq!(sold.lines[0].identity.name, "Widget");
    assert_eq!(sold.lines[0].identity.brand, "Acme");
    assert_eq!(sold.lines[0].unit_price.cents(), 999);

    let received = c.restock_event(restock.event.id).await.unwrap();
    assert_eq!(received.lines[0].identity.name, "Widget");
    assert_eq!(received.lines[0].price.cents(), 999);

    assert_eq!(c.product(widget.id).await.unwrap().name, "Widget Pro");
}

#[tokio::test]
async fn restocking_a_deleted_product_is_missing_product() {
    let (c, widget) = with_widget().await;
    c.delete_product(widget.id).await.unwrap();

    let err = c
        .apply_restock(at(7), &RestockRequest::from_pairs(&[(widget.id, 5)]))
        .await
        .unwrap_err();

    assert_eq!(rejected_kinds(err), vec![ValidationKind::MissingProduct]);
    assert!(c.restock_history().await.unwrap().is_empty());
}

// =============================================================================
// Validation Reporting
// =============================================================================

#[tokio::test]
async fn every_failing_restock_line_is_reported() {
    let (c, widget) = with_widget().await;

    let err = c
        .apply_restock(
            at(7),
            &RestockRequest::from_pairs(&[(widget.id, -1), (404, 3), (widget.id, 2)]),
        )
        .await
        .unwrap_err();

    let violations = err.violations().cloned().unwrap();
    let lines: Vec<_> = violations.iter().map(|v| v.line).collect();
    assert_eq!(lines, vec![Some(0), Some(1)]);
    assert_eq!(
        violations.kinds(),
        vec![ValidationKind::InvalidQuantity, ValidationKind::MissingProduct]
    );
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 10);
}

#[tokio::test]
async fn restock_past_the_stock_limit_is_rejected() {
    let (c, widget) = with_widget().await;

    let err = c
        .apply_restock(at(7), &RestockRequest::from_pairs(&[(widget.id, i64::MAX)]))
        .await
        .unwrap_err();

    assert_eq!(rejected_kinds(err), vec![ValidationKind::InvalidQuantity]);
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 10);
    assert!(c.restock_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn unrepresentable_sale_amount_is_rejected() {
    let c = coordinator().await;
    let bulk = c
        .add_product(&new_product("Bulk", 100, 1_000_000_000_000, 0))
        .await
        .unwrap();

    let err = c
        .apply_sale(
            at(7),
            &SaleRequest::new(
                &[(bulk.id, 1_000_000_000_000, dec("90000000000000000"))],
                dec("1"),
            ),
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_kinds(err), vec![ValidationKind::InvalidAmount]);

    // The writer lock was released: the next sale goes through.
    let outcome = c
        .apply_sale(at(7), &SaleRequest::new(&[(bulk.id, 1, dec("1"))], dec("1")))
        .await
        .unwrap();
    assert_eq!(outcome.products[0].quantity, 999_999_999_999);
}

#[tokio::test]
async fn short_payment_is_rejected() {
    let (c, widget) = with_widget().await;

    let err = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 3, dec("9.99"))], dec("29.96")))
        .await
        .unwrap_err();

    assert_eq!(rejected_kinds(err), vec![ValidationKind::InsufficientPayment]);
    assert!(c.sale_history().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_lines_are_checked_against_combined_quantity() {
    let (c, widget) = with_widget().await;

    let err = c
        .apply_sale(
            at(7),
            &SaleRequest::new(&[(widget.id, 6, dec("1")), (widget.id, 5, dec("1"))], dec("20")),
        )
        .await
        .unwrap_err();
    assert_eq!(rejected_kinds(err), vec![ValidationKind::InsufficientStock]);

    let outcome = c
        .apply_sale(
            at(7),
            &SaleRequest::new(&[(widget.id, 6, dec("1")), (widget.id, 4, dec("1"))], dec("20")),
        )
        .await
        .unwrap();
    assert_eq!(outcome.products.len(), 1);
    assert_eq!(outcome.products[0].quantity, 0);
    assert_eq!(outcome.event.lines.len(), 2);
}

#[tokio::test]
async fn sale_price_may_differ_from_list_price() {
    let (c, widget) = with_widget().await;

    let outcome = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 2, dec("7.505"))], dec("20")))
        .await
        .unwrap();

    let line = &outcome.event.lines[0];
    assert_eq!(line.unit_price.cents(), 751);
    assert_eq!(line.line_total.cents(), 1501);
    assert_eq!(outcome.event.total.cents(), 1501);
    assert_eq!(outcome.event.change.cents(), 499);
}

// =============================================================================
// Properties
// =============================================================================

#[tokio::test]
async fn rounding_law_holds_for_committed_sales() {
    let (c, widget) = with_widget().await;
    c.apply_restock(at(1), &RestockRequest::from_pairs(&[(widget.id, 100)]))
        .await
        .unwrap();

    let cases = [
        ("0.335", 3, "1.01"),
        ("9.99", 1, "10.004"),
        ("2.345", 2, "5"),
        ("0.01", 7, "0.075"),
        ("3.333", 3, "10.00"),
    ];
    for (unit, qty, paid) in cases {
        let outcome = c
            .apply_sale(at(2), &SaleRequest::new(&[(widget.id, qty, dec(unit))], dec(paid)))
            .await
            .unwrap();
        let event = outcome.event;
        assert_eq!(
            event.change + event.total,
            Money::round_half_up(dec(paid)).unwrap(),
            "unit {unit} × {qty}, paid {paid}"
        );
        assert!(!event.change.is_negative());
    }
}

#[tokio::test]
async fn stock_deltas_match_ledger_quantities() {
    let c = coordinator().await;
    let a = c.add_product(&new_product("A", 100, 0, 0)).await.unwrap();
    let b = c.add_product(&new_product("B", 200, 3, 0)).await.unwrap();

    c.apply_restock(at(1), &RestockRequest::from_pairs(&[(a.id, 4), (b.id, 6), (a.id, 1)]))
        .await
        .unwrap();
    c.apply_sale(
        at(2),
        &SaleRequest::new(&[(a.id, 2, dec("1")), (b.id, 9, dec("2"))], dec("100")),
    )
    .await
    .unwrap();

    let restocked: i64 = c.restock_history().await.unwrap().iter().map(|e| e.total_units()).sum();
    let sold: i64 = c.sale_history().await.unwrap().iter().map(|e| e.total_units()).sum();
    assert_eq!(restocked, 11);
    assert_eq!(sold, 11);

    assert_eq!(c.product(a.id).await.unwrap().quantity, 0 + 5 - 2);
    assert_eq!(c.product(b.id).await.unwrap().quantity, 3 + 6 - 9);
}

#[tokio::test]
async fn reads_are_idempotent() {
    let (c, widget) = with_widget().await;
    c.apply_sale(at(7), &SaleRequest::new(&[(widget.id, 1, dec("9.99"))], dec("10")))
        .await
        .unwrap();

    assert_eq!(snapshot(&c).await, snapshot(&c).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_never_oversell() {
    let (c, widget) = with_widget().await;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let c = c.clone();
        handles.push(tokio::spawn(async move {
            c.apply_sale(at(7), &SaleRequest::new(&[(widget.id, 4, dec("1"))], dec("4")))
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => committed += 1,
            Err(err) => assert_eq!(rejected_kinds(err), vec![ValidationKind::InsufficientStock]),
        }
    }

    assert_eq!(committed, 2);
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 2);
    assert_eq!(c.sale_history().await.unwrap().len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_coordinators_share_one_writer_lock() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let widget = Coordinator::new(db.clone())
        .add_product(&new_product("Widget", 100, 10, 0))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let c = Coordinator::new(db.clone());
        handles.push(tokio::spawn(async move {
            c.apply_sale(at(7), &SaleRequest::new(&[(widget.id, 4, dec("1"))], dec("4")))
                .await
        }));
    }

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            committed += 1;
        }
    }

    let c = Coordinator::new(db);
    assert_eq!(committed, 2);
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 2);
}

// =============================================================================
// Rollback
// =============================================================================

#[tokio::test]
async fn storage_failure_mid_commit_rolls_everything_back() {
    let (c, widget) = with_widget().await;
    let fragile = c.add_product(&new_product("Fragile", 100, 5, 0)).await.unwrap();

    // Fails the second stock update, after the event, both lines and the
    // first update have already been written.
    sqlx::query(
        "CREATE TRIGGER fail_fragile_update BEFORE UPDATE OF quantity ON products \
         WHEN NEW.name = 'Fragile' BEGIN SELECT RAISE(ABORT, 'injected failure'); END",
    )
    .execute(c.database().pool())
    .await
    .unwrap();

    let before = snapshot(&c).await;
    let err = c
        .apply_sale(
            at(7),
            &SaleRequest::new(&[(widget.id, 2, dec("9.99")), (fragile.id, 1, dec("1"))], dec("50")),
        )
        .await
        .unwrap_err();

    assert!(
        matches!(err, StockError::CommitFailed(CommitFailure::Persistence(_))),
        "unexpected error: {err}"
    );
    assert_eq!(snapshot(&c).await, before);
}

#[tokio::test]
async fn timed_out_commit_is_rolled_back() {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let c = Coordinator::new(db.clone());
    let widget = c.add_product(&new_product("Widget", 999, 10, 5)).await.unwrap();

    let impatient = Coordinator::new(db.with_operation_timeout(Duration::ZERO));
    let err = impatient
        .apply_restock(at(7), &RestockRequest::from_pairs(&[(widget.id, 5)]))
        .await
        .unwrap_err();

    assert!(matches!(err, StockError::CommitFailed(CommitFailure::Timeout)));
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 10);
    assert!(c.restock_history().await.unwrap().is_empty());
}

// =============================================================================
// Catalog and History Maintenance
// =============================================================================

#[tokio::test]
async fn invalid_product_fields_are_rejected() {
    let c = coordinator().await;
    let mut draft = new_product("", 100, 1, 0);
    draft.restock_threshold = -1;

    let err = c.add_product(&draft).await.unwrap_err();
    assert_eq!(
        rejected_kinds(err),
        vec![
            ValidationKind::IncompleteProductFields,
            ValidationKind::IncompleteProductFields
        ]
    );
    assert!(c.products().await.unwrap().is_empty());
}

#[tokio::test]
async fn updating_a_product_preserves_stock() {
    let (c, widget) = with_widget().await;
    let mut update = ProductUpdate::from(&widget);
    update.price = Money::from_cents(1099);
    update.restock_threshold = 12;

    let updated = c.update_product(widget.id, &update).await.unwrap();
    assert_eq!(updated.price.cents(), 1099);
    assert_eq!(updated.quantity, 10);
    assert!(updated.is_low_stock());
    assert_eq!(c.low_stock().await.unwrap(), vec![updated]);

    assert!(matches!(
        c.update_product(999, &update).await,
        Err(StockError::NotFound { .. })
    ));
}

#[tokio::test]
async fn deleting_history_leaves_stock_alone() {
    let (c, widget) = with_widget().await;
    let sale = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 2, dec("9.99"))], dec("20")))
        .await
        .unwrap();
    let restock = c
        .apply_restock(at(8), &RestockRequest::from_pairs(&[(widget.id, 1)]))
        .await
        .unwrap();

    assert_eq!(c.sale_event(sale.event.id).await.unwrap(), sale.event);
    c.delete_sale_event(sale.event.id).await.unwrap();
    c.delete_restock_event(restock.event.id).await.unwrap();

    assert!(c.sale_history().await.unwrap().is_empty());
    assert!(c.restock_history().await.unwrap().is_empty());
    assert_eq!(c.product(widget.id).await.unwrap().quantity, 9);
    assert!(matches!(
        c.delete_sale_event(sale.event.id).await,
        Err(StockError::NotFound { .. })
    ));
    assert!(matches!(
        c.sale_event(sale.event.id).await,
        Err(StockError::NotFound { .. })
    ));
}

#[tokio::test]
async fn monthly_summary_counts_sales() {
    let (c, widget) = with_widget().await;
    for day in [1, 15] {
        c.apply_sale(at(day), &SaleRequest::new(&[(widget.id, 2, dec("9.99"))], dec("20")))
            .await
            .unwrap();
    }

    let summary = c.sales_summary(2024, 3).await.unwrap();
    assert_eq!(summary.sale_count, 2);
    assert_eq!(summary.units_sold, 4);
    assert_eq!(summary.revenue.cents(), 3996);
    assert_eq!(c.sales_for_period(2024, 3).await.unwrap().len(), 2);
    assert!(c.sales_for_period(2024, 4).await.unwrap().is_empty());
}

#[tokio::test]
async fn cashiers_cannot_restock() {
    let c = coordinator().await;
    assert!(c.authorize(Role::Cashier, Operation::Sell).is_ok());
    assert!(c.authorize(Role::Restocker, Operation::Restock).is_ok());

    let err = c.authorize(Role::Cashier, Operation::Restock).unwrap_err();
    assert_eq!(err.to_string(), "role 'cashier' may not restock");
}

#[tokio::test]
async fn outcomes_serialize_for_the_ui() {
    let (c, widget) = with_widget().await;
    let outcome = c
        .apply_sale(at(7), &SaleRequest::new(&[(widget.id, 1, dec("9.99"))], dec("10")))
        .await
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["event"]["total"], 999);
    assert_eq!(json["event"]["lines"][0]["type"], "General");
    assert_eq!(json["products"][0]["quantity"], 9);
}

//! # Ledger Store
//!
//! Append-only history of restocks and sales.
//!
//! ## Event Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  restock_events (id, year, month, day, time)                           │
//! │       │ 1                                                               │
//! │       └──* restock_lines (restock_id → CASCADE, product_id → SET NULL, │
//! │                           name, brand, size, type, price, quantity)     │
//! │                                                                         │
//! │  sale_events (id, year, month, day, time, total, payment, change)      │
//! │       │ 1                                                               │
//! │       └──* sale_lines (sale_id → CASCADE, product_id → SET NULL,       │
//! │                        name, brand, size, type,                         │
//! │                        quantity, unit_price, line_total)                │
//! │                                                                         │
//! │  Lines copy the product's fields at event time. Deleting the product   │
//! │  later only nulls product_id; the history still reads the same.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No business validation happens here. Appends trust that the Coordinator
//! has already validated every line, and run on its transaction connection.

use std::collections::HashMap;

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockbook_core::{
    EventTime, Money, ProductIdentity, RestockEvent, RestockLine, RestockLineDraft, SaleEvent,
    SaleLine, SaleLineDraft, SaleTotals, SalesSummary,
};

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct RestockEventRow {
    id: i64,
    year: String,
    month: String,
    day: String,
    time: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RestockLineRow {
    id: i64,
    restock_id: i64,
    product_id: Option<i64>,
    name: String,
    brand: String,
    size: String,
    #[sqlx(rename = "type")]
    product_type: String,
    price_cents: i64,
    quantity: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleEventRow {
    id: i64,
    year: String,
    month: String,
    day: String,
    time: String,
    total_cents: i64,
    payment_cents: i64,
    change_cents: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct SaleLineRow {
    id: i64,
    sale_id: i64,
    product_id: Option<i64>,
    name: String,
    brand: String,
    size: String,
    #[sqlx(rename = "type")]
    product_type: String,
    quantity: i64,
    unit_price_cents: i64,
    line_total_cents: i64,
}

fn occurred_at(entity: &str, id: i64, parts: [&str; 4]) -> DbResult<EventTime> {
    let [year, month, day, time] = parts;
    EventTime::compose(year, month, day, time).ok_or_else(|| {
        DbError::Internal(format!(
            "{entity} {id} has a malformed timestamp: {year}-{month}-{day} {time}"
        ))
    })
}

impl From<RestockLineRow> for RestockLine {
    fn from(row: RestockLineRow) -> Self {
        RestockLine {
            id: row.id,
            restock_id: row.restock_id,
            product_id: row.product_id,
            identity: ProductIdentity {
                name: row.name,
                brand: row.brand,
                size: row.size,
                product_type: row.product_type,
            },
            price: Money::from_cents(row.price_cents),
            quantity: row.quantity,
        }
    }
}

impl From<SaleLineRow> for SaleLine {
    fn from(row: SaleLineRow) -> Self {
        SaleLine {
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            identity: ProductIdentity {
                name: row.name,
                brand: row.brand,
                size: row.size,
                product_type: row.product_type,
            },
            quantity: row.quantity,
            unit_price: Money::from_cents(row.unit_price_cents),
            line_total: Money::from_cents(row.line_total_cents),
        }
    }
}

impl RestockEventRow {
    fn into_event(self, lines: Vec<RestockLine>) -> DbResult<RestockEvent> {
        Ok(RestockEvent {
            id: self.id,
            occurred_at: occurred_at(
                "RestockEvent",
                self.id,
                [&self.year, &self.month, &self.day, &self.time],
            )?,
            lines,
        })
    }
}

impl SaleEventRow {
    fn into_event(self, lines: Vec<SaleLine>) -> DbResult<SaleEvent> {
        Ok(SaleEvent {
            id: self.id,
            occurred_at: occurred_at(
                "SaleEvent",
                self.id,
                [&self.year, &self.month, &self.day, &self.time],
            )?,
            total: Money::from_cents(self.total_cents),
            payment: Money::from_cents(self.payment_cents),
            change: Money::from_cents(self.change_cents),
            lines,
        })
    }
}

/// Stored `(year, month)` text for a calendar month.
fn period_key(year: i32, month: u32) -> (String, String) {
    (format!("{:04}", year), format!("{:02}", month))
}

// =============================================================================
// SQL
// =============================================================================

const SELECT_RESTOCK_EVENTS: &str =
    "SELECT id, year, month, day, time FROM restock_events ORDER BY id";

const SELECT_RESTOCK_LINES: &str = "SELECT id, restock_id, product_id, name, brand, size, type, \
     price_cents, quantity FROM restock_lines ORDER BY restock_id, id";

const SELECT_SALE_EVENTS: &str = "SELECT id, year, month, day, time, total_cents, payment_cents, \
     change_cents FROM sale_events ORDER BY id";

const SELECT_SALE_EVENTS_FOR_PERIOD: &str = "SELECT id, year, month, day, time, total_cents, \
     payment_cents, change_cents FROM sale_events WHERE year = ?1 AND month = ?2 ORDER BY id";

const SELECT_SALE_LINES: &str = "SELECT id, sale_id, product_id, name, brand, size, type, \
     quantity, unit_price_cents, line_total_cents FROM sale_lines ORDER BY sale_id, id";

const SELECT_SALE_LINES_FOR_PERIOD: &str = "SELECT l.id, l.sale_id, l.product_id, l.name, \
     l.brand, l.size, l.type, l.quantity, l.unit_price_cents, l.line_total_cents \
     FROM sale_lines l JOIN sale_events e ON e.id = l.sale_id \
     WHERE e.year = ?1 AND e.month = ?2 ORDER BY l.sale_id, l.id";

// =============================================================================
// LedgerStore
// =============================================================================

/// Repository for the restock and sale ledgers.
#[derive(Debug, Clone)]
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Creates a new LedgerStore.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerStore { pool }
    }

    // -------------------------------------------------------------------------
    // Appends (inside a Coordinator transaction)
    // -------------------------------------------------------------------------

    /// Appends one restock event and its lines.
    ///
    /// Lines keep the order they are given in.
    pub(crate) async fn append_restock_event(
        conn: &mut SqliteConnection,
        at: EventTime,
        lines: &[RestockLineDraft],
    ) -> DbResult<RestockEvent> {
        let parts = at.decompose();
        let event_id = sqlx::query(
            "INSERT INTO restock_events (year, month, day, time) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&parts.year)
        .bind(&parts.month)
        .bind(&parts.day)
        .bind(&parts.time)
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!(restock_id = event_id, lines = lines.len(), "Appending restock event");

        let mut stored = Vec::with_capacity(lines.len());
        for line in lines {
            let line_id = sqlx::query(
                "INSERT INTO restock_lines \
                 (restock_id, product_id, name, brand, size, type, price_cents, quantity) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )
            .bind(event_id)
            .bind(line.product_id)
            .bind(&line.identity.name)
            .bind(&line.identity.brand)
            .bind(&line.identity.size)
            .bind(&line.identity.product_type)
            .bind(line.price.cents())
            .bind(line.quantity)
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

            stored.push(RestockLine {
                id: line_id,
                restock_id: event_id,
                product_id: Some(line.product_id),
                identity: line.identity.clone(),
                price: line.price,
                quantity: line.quantity,
            });
        }

        Ok(RestockEvent {
            id: event_id,
            occurred_at: at,
            lines: stored,
        })
    }

    /// Appends one sale event and its lines.
    pub(crate) async fn append_sale_event(
        conn: &mut SqliteConnection,
        at: EventTime,
        totals: SaleTotals,
        lines: &[SaleLineDraft],
    ) -> DbResult<SaleEvent> {
        let parts = at.decompose();
        let event_id = sqlx::query(
            "INSERT INTO sale_events \
             (year, month, day, time, total_cents, payment_cents, change_cents) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(&parts.year)
        .bind(&parts.month)
        .bind(&parts.day)
        .bind(&parts.time)
        .bind(totals.total.cents())
        .bind(totals.payment.cents())
        .bind(totals.change.cents())
        .execute(&mut *conn)
        .await?
        .last_insert_rowid();

        debug!(
            sale_id = event_id,
            lines = lines.len(),
            total = %totals.total,
            "Appending sale event"
        );

        let mut stored = Vec::with_capacity(lines.len());
        for line in lines {
            let line_id = sqlx::query(
                "INSERT INTO sale_lines \
                 (sale_id, product_id, name, brand, size, type, \
                  quantity, unit_price_cents, line_total_cents) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(event_id)
            .bind(line.product_id)
            .bind(&line.identity.name)
            .bind(&line.identity.brand)
            .bind(&line.identity.size)
            .bind(&line.identity.product_type)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.line_total.cents())
            .execute(&mut *conn)
            .await?
            .last_insert_rowid();

            stored.push(SaleLine {
                id: line_id,
                sale_id: event_id,
                product_id: Some(line.product_id),
                identity: line.identity.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
                line_total: line.line_total,
            });
        }

        Ok(SaleEvent {
            id: event_id,
            occurred_at: at,
            total: totals.total,
            payment: totals.payment,
            change: totals.change,
            lines: stored,
        })
    }

    /// Deletes a sale event; its lines go with it.
    pub(crate) async fn delete_sale_event(conn: &mut SqliteConnection, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting sale event");

        let result = sqlx::query("DELETE FROM sale_events WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SaleEvent", id));
        }
        Ok(())
    }

    /// Deletes a restock event; its lines go with it.
    pub(crate) async fn delete_restock_event(conn: &mut SqliteConnection, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting restock event");

        let result = sqlx::query("DELETE FROM restock_events WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("RestockEvent", id));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Lists every restock event with its lines, oldest first.
    ///
    /// Events and lines are read in one transaction, so a concurrent delete
    /// cannot leave an event without its lines.
    pub async fn list_restock_events(&self) -> DbResult<Vec<RestockEvent>> {
        let mut tx = self.pool.begin().await?;

        let events: Vec<RestockEventRow> = sqlx::query_as(SELECT_RESTOCK_EVENTS)
            .fetch_all(&mut *tx)
            .await?;
        let lines: Vec<RestockLineRow> = sqlx::query_as(SELECT_RESTOCK_LINES)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        let mut by_event: HashMap<i64, Vec<RestockLine>> = HashMap::new();
        for line in lines {
            by_event.entry(line.restock_id).or_default().push(line.into());
        }

        events
            .into_iter()
            .map(|row| {
                let lines = by_event.remove(&row.id).unwrap_or_default();
                row.into_event(lines)
            })
            .collect()
    }

    /// Lists every sale event with its lines, oldest first.
    pub async fn list_sale_events(&self) -> DbResult<Vec<SaleEvent>> {
        let mut tx = self.pool.begin().await?;

        let events: Vec<SaleEventRow> = sqlx::query_as(SELECT_SALE_EVENTS)
            .fetch_all(&mut *tx)
            .await?;
        let lines: Vec<SaleLineRow> = sqlx::query_as(SELECT_SALE_LINES)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        assemble_sales(events, lines)
    }

    /// Lists the sale events recorded in one calendar month.
    pub async fn sale_events_for_period(&self, year: i32, month: u32) -> DbResult<Vec<SaleEvent>> {
        let (year_key, month_key) = period_key(year, month);
        let mut tx = self.pool.begin().await?;

        let events: Vec<SaleEventRow> = sqlx::query_as(SELECT_SALE_EVENTS_FOR_PERIOD)
            .bind(&year_key)
            .bind(&month_key)
            .fetch_all(&mut *tx)
            .await?;
        let lines: Vec<SaleLineRow> = sqlx::query_as(SELECT_SALE_LINES_FOR_PERIOD)
            .bind(&year_key)
            .bind(&month_key)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        debug!(year, month, count = events.len(), "Loaded sales for period");
        assemble_sales(events, lines)
    }

    /// Totals the sales recorded in one calendar month.
    pub async fn sales_summary(&self, year: i32, month: u32) -> DbResult<SalesSummary> {
        let (year_key, month_key) = period_key(year, month);

        let (sale_count, units_sold, revenue_cents): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
               (SELECT COUNT(*) FROM sale_events WHERE year = ?1 AND month = ?2), \
               (SELECT COALESCE(SUM(l.quantity), 0) FROM sale_lines l \
                  JOIN sale_events e ON e.id = l.sale_id \
                  WHERE e.year = ?1 AND e.month = ?2), \
               (SELECT COALESCE(SUM(total_cents), 0) FROM sale_events \
                  WHERE year = ?1 AND month = ?2)",
        )
        .bind(&year_key)
        .bind(&month_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(SalesSummary {
            year,
            month,
            sale_count,
            units_sold,
            revenue: Money::from_cents(revenue_cents),
        })
    }

    /// Gets one sale event with its lines.
    pub async fn get_sale_event(&self, id: i64) -> DbResult<SaleEvent> {
        let mut tx = self.pool.begin().await?;

        let event: Option<SaleEventRow> = sqlx::query_as(
            "SELECT id, year, month, day, time, total_cents, payment_cents, change_cents \
             FROM sale_events WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let event = event.ok_or_else(|| DbError::not_found("SaleEvent", id))?;

        let lines: Vec<SaleLineRow> = sqlx::query_as(
            "SELECT id, sale_id, product_id, name, brand, size, type, \
             quantity, unit_price_cents, line_total_cents \
             FROM sale_lines WHERE sale_id = ?1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        event.into_event(lines.into_iter().map(SaleLine::from).collect())
    }

    /// Gets one restock event with its lines.
    pub async fn get_restock_event(&self, id: i64) -> DbResult<RestockEvent> {
        let mut tx = self.pool.begin().await?;

        let event: Option<RestockEventRow> =
            sqlx::query_as("SELECT id, year, month, day, time FROM restock_events WHERE id = ?1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let event = event.ok_or_else(|| DbError::not_found("RestockEvent", id))?;

        let lines: Vec<RestockLineRow> = sqlx::query_as(
            "SELECT id, restock_id, product_id, name, brand, size, type, price_cents, quantity \
             FROM restock_lines WHERE restock_id = ?1 ORDER BY id",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        event.into_event(lines.into_iter().map(RestockLine::from).collect())
    }
}

fn assemble_sales(events: Vec<SaleEventRow>, lines: Vec<SaleLineRow>) -> DbResult<Vec<SaleEvent>> {
    let mut by_event: HashMap<i64, Vec<SaleLine>> = HashMap::new();
    for line in lines {
        by_event.entry(line.sale_id).or_default().push(line.into());
    }

    events
        .into_iter()
        .map(|row| {
            let lines = by_event.remove(&row.id).unwrap_or_default();
            row.into_event(lines)
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::catalog::ProductCatalog;
    use crate::{Database, DbConfig};
    use chrono::NaiveDate;
    use stockbook_core::{NewProduct, Product};

    fn at(year: i32, month: u32, day: u32) -> EventTime {
        EventTime::new(
            NaiveDate::from_ymd_opt(year, month, day)
                .unwrap()
                .and_hms_opt(14, 30, 5)
                .unwrap(),
        )
    }

    async fn with_product() -> (Database, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let product = ProductCatalog::insert(
            &mut conn,
            &NewProduct {
                name: "Oat Milk".to_string(),
                brand: "Oaty".to_string(),
                size: "1L".to_string(),
                product_type: "Dairy".to_string(),
                price: Money::from_cents(329),
                quantity: 20,
                restock_threshold: 4,
            },
        )
        .await
        .unwrap();
        drop(conn);
        (db, product)
    }

    fn sale_line(product: &Product, quantity: i64) -> SaleLineDraft {
        SaleLineDraft {
            product_id: product.id,
            identity: product.identity(),
            quantity,
            unit_price: product.price,
            line_total: product.price.multiply_quantity(quantity),
        }
    }

    fn totals(total: i64, payment: i64) -> SaleTotals {
        SaleTotals {
            total: Money::from_cents(total),
            payment: Money::from_cents(payment),
            change: Money::from_cents(payment - total),
        }
    }

    #[tokio::test]
    async fn test_restock_append_and_list() {
        let (db, product) = with_product().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let draft = RestockLineDraft {
            product_id: product.id,
            identity: product.identity(),
            price: product.price,
            quantity: 6,
        };

        let event = LedgerStore::append_restock_event(&mut conn, at(2024, 3, 7), &[draft])
            .await
            .unwrap();
        drop(conn);

        let listed = db.ledger().list_restock_events().await.unwrap();
        assert_eq!(listed, vec![event.clone()]);
        assert_eq!(listed[0].occurred_at, at(2024, 3, 7));
        assert_eq!(db.ledger().get_restock_event(event.id).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_delete_sale_event_cascades_to_lines() {
        let (db, product) = with_product().await;
        let mut conn = db.pool().acquire().await.unwrap();
        let event = LedgerStore::append_sale_event(
            &mut conn,
            at(2024, 3, 7),
            totals(658, 1000),
            &[sale_line(&product, 2)],
        )
        .await
        .unwrap();

        LedgerStore::delete_sale_event(&mut conn, event.id).await.unwrap();
        let orphaned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sale_lines")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(orphaned, 0);

        let err = LedgerStore::delete_sale_event(&mut conn, event.id).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_history_reads_release_their_transaction() {
        let (db, product) = with_product().await;
        let mut conn = db.pool().acquire().await.unwrap();
        LedgerStore::append_sale_event(&mut conn, at(2024, 5, 2), totals(329, 500), &[sale_line(&product, 1)])
            .await
            .unwrap();
        drop(conn);

        let sales = db.ledger().list_sale_events().await.unwrap();
        assert_eq!(sales[0].lines.len(), 1);
        let single = db.ledger().get_sale_event(sales[0].id).await.unwrap();
        assert_eq!(single, sales[0]);

        // The single pooled connection must be free for a write afterwards.
        let deleted = db
            .in_transaction("delete_after_read", move |conn| {
                Box::pin(async move { LedgerStore::delete_sale_event(conn, single.id).await })
            })
            .await;
        assert!(deleted.is_ok());
        assert!(db.ledger().list_sale_events().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_period_queries() {
        let (db, product) = with_product().await;
        let mut conn = db.pool().acquire().await.unwrap();
        for (when, qty) in [(at(2024, 3, 1), 1), (at(2024, 3, 30), 2), (at(2024, 4, 2), 5)] {
            let line = sale_line(&product, qty);
            let total = line.line_total.cents();
            LedgerStore::append_sale_event(&mut conn, when, totals(total, total), &[line])
                .await
                .unwrap();
        }
        drop(conn);

        let march = db.ledger().sale_events_for_period(2024, 3).await.unwrap();
        assert_eq!(march.len(), 2);
        assert!(march.iter().all(|e| e.lines.len() == 1));

        let summary = db.ledger().sales_summary(2024, 3).await.unwrap();
        assert_eq!(summary.sale_count, 2);
        assert_eq!(summary.units_sold, 3);
        assert_eq!(summary.revenue.cents(), 329 * 3);

        let empty = db.ledger().sales_summary(2023, 12).await.unwrap();
        assert_eq!(empty.sale_count, 0);
        assert!(empty.revenue.is_zero());
    }
}

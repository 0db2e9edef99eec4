//! # Consistency Coordinator
//!
//! The only write path into the catalog and the ledger.
//!
//! ## Compound Operation Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 apply_restock / apply_sale                              │
//! │                                                                         │
//! │  acquire writer lock ─────────────────────────────────────────┐        │
//! │       │                                                        │        │
//! │       ▼                                                        │        │
//! │  Validating: read products, plan every line                    │ held   │
//! │       │                                                        │ until  │
//! │       ├── any violation ──► Aborted (Rejected, no writes)      │ return │
//! │       ▼                                                        │        │
//! │  Committing: one transaction                                   │        │
//! │       │   append event + lines                                 │        │
//! │       │   adjust_quantity per line                             │        │
//! │       │                                                        │        │
//! │       ├── all Ok  ──► Committed (event + product snapshots)    │        │
//! │       └── any Err ──► RolledBack (CommitFailed, no writes)     │        │
//! │                                                                │        │
//! │  release writer lock ◄────────────────────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No partially applied state is ever observable: either every stock change
//! and ledger row commits, or none does. Failed operations are never retried
//! automatically; the caller re-submits.

use std::collections::HashMap;

use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{DbError, StockError, StockResult};
use crate::pool::Database;
use crate::repository::catalog::ProductCatalog;
use crate::repository::ledger::LedgerStore;
use stockbook_core::validation::{plan_restock, plan_sale, validate_new_product, validate_product_update};
use stockbook_core::{
    can_perform, EventTime, NewProduct, Operation, Product, ProductUpdate, RestockEvent,
    RestockOutcome, RestockRequest, Role, SaleEvent, SaleOutcome, SaleRequest, SalesSummary,
    Violations,
};

/// Executes every mutation of stock and history.
///
/// Every coordinator over the same [`Database`] shares its writer lock, so
/// two compound operations never interleave their validate and commit
/// phases.
///
/// ## Usage
/// ```rust,ignore
/// let coordinator = Coordinator::new(db);
///
/// coordinator.authorize(user.role, Operation::Sell)?;
/// let outcome = coordinator.apply_sale(EventTime::now(), &request).await?;
/// print_receipt(&outcome.event);
/// ```
#[derive(Debug, Clone)]
pub struct Coordinator {
    db: Database,
}

impl Coordinator {
    /// Creates a coordinator over an open database.
    pub fn new(db: Database) -> Self {
        Coordinator { db }
    }

    /// The underlying database handle, for reads.
    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Checks the access table.
    ///
    /// ## Returns
    /// * `Ok(())` - `role` may perform `operation`
    /// * `Err(StockError::Forbidden)` - it may not
    pub fn authorize(&self, role: Role, operation: Operation) -> StockResult<()> {
        if can_perform(role, operation) {
            Ok(())
        } else {
            warn!(role = %role, operation = %operation, "Operation forbidden");
            Err(StockError::Forbidden { role, operation })
        }
    }

    // =========================================================================
    // Compound Operations
    // =========================================================================

    /// Receives stock for one or more products.
    ///
    /// Each line adds its quantity to the product and is recorded in one
    /// restock event, snapshotting the product as it was before the restock.
    ///
    /// ## Returns
    /// * `Ok(RestockOutcome)` - The event and the updated products
    /// * `Err(StockError::Rejected)` - Every failing line; nothing written
    /// * `Err(StockError::CommitFailed)` - Rolled back; nothing written
    pub async fn apply_restock(
        &self,
        at: EventTime,
        request: &RestockRequest,
    ) -> StockResult<RestockOutcome> {
        let span = info_span!(
            "apply_restock",
            op_id = %Uuid::new_v4(),
            lines = request.lines.len()
        );

        async move {
            let _writer = self.db.lock_writer().await;

            let ids: Vec<i64> = request.lines.iter().map(|l| l.product_id).collect();
            let products = self.db.catalog().snapshot(&ids).await?;
            let drafts = plan_restock(request, &products).map_err(reject)?;

            let (event, updated) = self
                .db
                .in_transaction("apply_restock", move |conn| {
                    Box::pin(async move {
                        let event = LedgerStore::append_restock_event(conn, at, &drafts).await?;
                        let mut updated = Vec::with_capacity(drafts.len());
                        for line in &drafts {
                            updated.push(
                                ProductCatalog::adjust_quantity(conn, line.product_id, line.quantity)
                                    .await?,
                            );
                        }
                        Ok::<_, DbError>((event, updated))
                    })
                })
                .await
                .map_err(rolled_back)?;

            info!(
                restock_id = event.id,
                units = event.total_units(),
                "Restock committed"
            );

            Ok::<_, StockError>(RestockOutcome {
                event,
                products: latest_per_product(updated),
            })
        }
        .instrument(span)
        .await
    }

    /// Sells one or more products.
    ///
    /// The total is rounded once from the exact sum of
    /// `unit_price × quantity`; change is the rounded payment minus the total.
    ///
    /// ## Returns
    /// * `Ok(SaleOutcome)` - The event (everything a receipt needs) and the
    ///   updated products
    /// * `Err(StockError::Rejected)` - Every failing line plus any payment
    ///   shortfall; nothing written
    /// * `Err(StockError::CommitFailed)` - Rolled back; nothing written
    pub async fn apply_sale(&self, at: EventTime, request: &SaleRequest) -> StockResult<SaleOutcome> {
        let span = info_span!(
            "apply_sale",
            op_id = %Uuid::new_v4(),
            lines = request.lines.len()
        );

        async move {
            let _writer = self.db.lock_writer().await;

            let ids: Vec<i64> = request.lines.iter().map(|l| l.product_id).collect();
            let products = self.db.catalog().snapshot(&ids).await?;
            let (drafts, totals) = plan_sale(request, &products).map_err(reject)?;

            let (event, updated) = self
                .db
                .in_transaction("apply_sale", move |conn| {
                    Box::pin(async move {
                        let event = LedgerStore::append_sale_event(conn, at, totals, &drafts).await?;
                        let mut updated = Vec::with_capacity(drafts.len());
                        for line in &drafts {
                            updated.push(
                                ProductCatalog::adjust_quantity(conn, line.product_id, -line.quantity)
                                    .await?,
                            );
                        }
                        Ok::<_, DbError>((event, updated))
                    })
                })
                .await
                .map_err(rolled_back)?;

            info!(
                sale_id = event.id,
                total = %event.total,
                change = %event.change,
                "Sale committed"
            );

            Ok::<_, StockError>(SaleOutcome {
                event,
                products: latest_per_product(updated),
            })
        }
        .instrument(span)
        .await
    }

    // =========================================================================
    // Catalog Maintenance
    // =========================================================================

    /// Adds a product to the catalog.
    pub async fn add_product(&self, draft: &NewProduct) -> StockResult<Product> {
        validate_new_product(draft).map_err(reject)?;

        let _writer = self.db.lock_writer().await;
        let draft = draft.clone();
        let product = self
            .db
            .in_transaction("add_product", move |conn| {
                Box::pin(async move { ProductCatalog::insert(conn, &draft).await })
            })
            .await
            .map_err(rolled_back)?;

        info!(id = product.id, name = %product.name, "Product added");
        Ok(product)
    }

    /// Edits a product's descriptive fields.
    ///
    /// Quantity cannot be changed here; stock moves only through
    /// [`apply_restock`](Self::apply_restock) and [`apply_sale`](Self::apply_sale).
    pub async fn update_product(&self, id: i64, update: &ProductUpdate) -> StockResult<Product> {
        validate_product_update(update).map_err(reject)?;

        let _writer = self.db.lock_writer().await;
        let update = update.clone();
        let product = self
            .db
            .in_transaction("update_product", move |conn| {
                Box::pin(async move { ProductCatalog::update(conn, id, &update).await })
            })
            .await
            .map_err(rolled_back)?;

        info!(id, "Product updated");
        Ok(product)
    }

    /// Deletes a product. Its ledger lines remain, with no product reference.
    pub async fn delete_product(&self, id: i64) -> StockResult<()> {
        let _writer = self.db.lock_writer().await;
        self.db
            .in_transaction("delete_product", move |conn| {
                Box::pin(async move { ProductCatalog::delete(conn, id).await })
            })
            .await
            .map_err(rolled_back)?;

        info!(id, "Product deleted");
        Ok(())
    }

    // =========================================================================
    // History Maintenance
    // =========================================================================

    /// Deletes a sale event and its lines. Stock is not touched.
    pub async fn delete_sale_event(&self, id: i64) -> StockResult<()> {
        let _writer = self.db.lock_writer().await;
        self.db
            .in_transaction("delete_sale_event", move |conn| {
                Box::pin(async move { LedgerStore::delete_sale_event(conn, id).await })
            })
            .await
            .map_err(rolled_back)?;

        info!(id, "Sale event deleted");
        Ok(())
    }

    /// Deletes a restock event and its lines. Stock is not touched.
    pub async fn delete_restock_event(&self, id: i64) -> StockResult<()> {
        let _writer = self.db.lock_writer().await;
        self.db
            .in_transaction("delete_restock_event", move |conn| {
                Box::pin(async move { LedgerStore::delete_restock_event(conn, id).await })
            })
            .await
            .map_err(rolled_back)?;

        info!(id, "Restock event deleted");
        Ok(())
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn product(&self, id: i64) -> StockResult<Product> {
        Ok(self.db.catalog().get(id).await?)
    }

    pub async fn products(&self) -> StockResult<Vec<Product>> {
        Ok(self.db.catalog().list().await?)
    }

    pub async fn low_stock(&self) -> StockResult<Vec<Product>> {
        Ok(self.db.catalog().list_low_stock().await?)
    }

    pub async fn search(&self, term: &str) -> StockResult<Vec<Product>> {
        Ok(self.db.catalog().search(term).await?)
    }

    pub async fn restock_history(&self) -> StockResult<Vec<RestockEvent>> {
        Ok(self.db.ledger().list_restock_events().await?)
    }

    pub async fn sale_history(&self) -> StockResult<Vec<SaleEvent>> {
        Ok(self.db.ledger().list_sale_events().await?)
    }

    /// One sale event with its lines, e.g. to reprint a receipt.
    pub async fn sale_event(&self, id: i64) -> StockResult<SaleEvent> {
        Ok(self.db.ledger().get_sale_event(id).await?)
    }

    pub async fn restock_event(&self, id: i64) -> StockResult<RestockEvent> {
        Ok(self.db.ledger().get_restock_event(id).await?)
    }

    pub async fn sales_for_period(&self, year: i32, month: u32) -> StockResult<Vec<SaleEvent>> {
        Ok(self.db.ledger().sale_events_for_period(year, month).await?)
    }

    pub async fn sales_summary(&self, year: i32, month: u32) -> StockResult<SalesSummary> {
        Ok(self.db.ledger().sales_summary(year, month).await?)
    }
}

fn reject(violations: Violations) -> StockError {
    warn!(count = violations.len(), violations = %violations, "Request rejected");
    StockError::Rejected(violations)
}

fn rolled_back(err: DbError) -> StockError {
    match &err {
        DbError::Rule(_) | DbError::Constraint { .. } | DbError::NotFound { .. } => {
            warn!(error = %err, "Transaction rolled back")
        }
        _ => error!(error = %err, "Transaction rolled back"),
    }
    StockError::commit_failed(err)
}

/// Keeps one snapshot per product, in first-seen order, holding the state
/// after its last adjustment.
fn latest_per_product(snapshots: Vec<Product>) -> Vec<Product> {
    let mut position: HashMap<i64, usize> = HashMap::new();
    let mut latest: Vec<Product> = Vec::with_capacity(snapshots.len());
    for product in snapshots {
        match position.get(&product.id) {
            Some(&i) => latest[i] = product,
            None => {
                position.insert(product.id, latest.len());
                latest.push(product);
            }
        }
    }
    latest
}

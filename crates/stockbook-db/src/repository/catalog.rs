//! # Product Catalog
//!
//! The authoritative current-stock record for every product.
//!
//! ## Read / Write Split
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Who May Touch the Catalog                            │
//! │                                                                         │
//! │  Anyone with a Database handle:                                        │
//! │    catalog.get / find / list / list_low_stock / search / count         │
//! │    (pool reads, each a consistent snapshot)                            │
//! │                                                                         │
//! │  Coordinator only (pub(crate), inside its transaction):                │
//! │    insert / update / delete / adjust_quantity                          │
//! │    (take the transaction's &mut SqliteConnection)                      │
//! │                                                                         │
//! │  So quantity can never change except through a restock or a sale.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use stockbook_core::validation::validate_stock_adjustment;
use stockbook_core::{Money, NewProduct, Product, ProductUpdate};

macro_rules! select_products {
    ($tail:literal) => {
        concat!(
            "SELECT id, name, brand, size, type, price_cents, quantity, restock_threshold FROM products ",
            $tail
        )
    };
}

const RETURNING_PRODUCT: &str =
    "RETURNING id, name, brand, size, type, price_cents, quantity, restock_threshold";

/// A `products` row.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    brand: String,
    size: String,
    #[sqlx(rename = "type")]
    product_type: String,
    price_cents: i64,
    quantity: i64,
    restock_threshold: i64,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            brand: row.brand,
            size: row.size,
            product_type: row.product_type,
            price: Money::from_cents(row.price_cents),
            quantity: row.quantity,
            restock_threshold: row.restock_threshold,
        }
    }
}

/// Escapes `%`, `_` and `\` so user input matches literally in `LIKE`.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Repository for product database operations.
///
/// ## Usage
/// ```rust,ignore
/// let catalog = db.catalog();
///
/// let cola = catalog.get(1).await?;
/// let reorder = catalog.list_low_stock().await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductCatalog {
    pool: SqlitePool,
}

impl ProductCatalog {
    /// Creates a new ProductCatalog.
    pub fn new(pool: SqlitePool) -> Self {
        ProductCatalog { pool }
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// Gets a product by id.
    ///
    /// ## Returns
    /// * `Ok(Product)` - Product found
    /// * `Err(DbError::NotFound)` - No product with that id
    pub async fn get(&self, id: i64) -> DbResult<Product> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Gets a product by id, `None` if it does not exist.
    pub async fn find(&self, id: i64) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn, id).await
    }

    /// Lists every product, ordered by id.
    ///
    /// The returned vector is a copy; mutating it changes nothing stored.
    pub async fn list(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(select_products!("ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        debug!(count = rows.len(), "Listed products");
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Lists products whose quantity is strictly below their restock threshold.
    ///
    /// Same predicate as [`Product::is_low_stock`].
    pub async fn list_low_stock(&self) -> DbResult<Vec<Product>> {
        let rows: Vec<ProductRow> = sqlx::query_as(select_products!(
            "WHERE quantity < restock_threshold ORDER BY quantity, id"
        ))
        .fetch_all(&self.pool)
        .await?;

        debug!(count = rows.len(), "Listed low-stock products");
        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Case-insensitive substring search over name, brand and type.
    ///
    /// An empty term lists everything.
    pub async fn search(&self, term: &str) -> DbResult<Vec<Product>> {
        let term = term.trim();
        if term.is_empty() {
            return self.list().await;
        }

        debug!(term = %term, "Searching products");

        let rows: Vec<ProductRow> = sqlx::query_as(select_products!(
            r"WHERE lower(name) LIKE ?1 ESCAPE '\'
               OR lower(brand) LIKE ?1 ESCAPE '\'
               OR lower(type) LIKE ?1 ESCAPE '\'
             ORDER BY name, id"
        ))
        .bind(like_pattern(term))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    /// Counts products.
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Fetches the current state of each id that exists.
    ///
    /// Missing ids are simply absent from the map.
    pub(crate) async fn snapshot(&self, ids: &[i64]) -> DbResult<HashMap<i64, Product>> {
        let mut conn = self.pool.acquire().await?;
        let mut found = HashMap::with_capacity(ids.len());
        for &id in ids {
            if found.contains_key(&id) {
                continue;
            }
            if let Some(product) = Self::fetch(&mut conn, id).await? {
                found.insert(id, product);
            }
        }
        Ok(found)
    }

    // -------------------------------------------------------------------------
    // Writes (inside a Coordinator transaction)
    // -------------------------------------------------------------------------

    pub(crate) async fn fetch(conn: &mut SqliteConnection, id: i64) -> DbResult<Option<Product>> {
        let row: Option<ProductRow> = sqlx::query_as(select_products!("WHERE id = ?1"))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

        Ok(row.map(Product::from))
    }

    /// Inserts a product and returns it with its generated id.
    ///
    /// Field rules are enforced by the schema's CHECK constraints as well as
    /// by the Coordinator's validation pass.
    pub(crate) async fn insert(conn: &mut SqliteConnection, draft: &NewProduct) -> DbResult<Product> {
        debug!(name = %draft.name, "Inserting product");

        let sql = format!(
            "INSERT INTO products (name, brand, size, type, price_cents, quantity, restock_threshold) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) {RETURNING_PRODUCT}"
        );
        let row: ProductRow = sqlx::query_as(&sql)
            .bind(&draft.name)
            .bind(&draft.brand)
            .bind(&draft.size)
            .bind(&draft.product_type)
            .bind(draft.price.cents())
            .bind(draft.quantity)
            .bind(draft.restock_threshold)
            .fetch_one(&mut *conn)
            .await?;

        Ok(row.into())
    }

    /// Replaces a product's descriptive fields. Quantity is left untouched.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The product after the update
    /// * `Err(DbError::NotFound)` - No product with that id
    pub(crate) async fn update(
        conn: &mut SqliteConnection,
        id: i64,
        update: &ProductUpdate,
    ) -> DbResult<Product> {
        debug!(id = %id, "Updating product");

        let sql = format!(
            "UPDATE products SET name = ?2, brand = ?3, size = ?4, type = ?5, \
             price_cents = ?6, restock_threshold = ?7 WHERE id = ?1 {RETURNING_PRODUCT}"
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(&update.name)
            .bind(&update.brand)
            .bind(&update.size)
            .bind(&update.product_type)
            .bind(update.price.cents())
            .bind(update.restock_threshold)
            .fetch_optional(&mut *conn)
            .await?;

        row.map(Product::from)
            .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product.
    ///
    /// Ledger lines that reference it survive with `product_id = NULL`.
    pub(crate) async fn delete(conn: &mut SqliteConnection, id: i64) -> DbResult<()> {
        debug!(id = %id, "Deleting product");

        let result = sqlx::query("DELETE FROM products WHERE id = ?1")
            .bind(id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Adds `delta` to a product's quantity.
    ///
    /// ## Guarded Delta Update
    /// ```text
    /// UPDATE products SET quantity = quantity + :delta
    ///  WHERE id = :id AND quantity + :delta >= 0
    /// ```
    /// The guard and the write are one statement, so the result can never be
    /// negative regardless of what was read earlier. When no row matches, a
    /// follow-up read tells a missing product apart from a refused delta.
    ///
    /// ## Returns
    /// * `Ok(Product)` - The product after the adjustment
    /// * `Err(DbError::NotFound)` - No product with that id
    /// * `Err(DbError::Rule(NegativeStock))` - Quantity would drop below zero
    pub(crate) async fn adjust_quantity(
        conn: &mut SqliteConnection,
        id: i64,
        delta: i64,
    ) -> DbResult<Product> {
        debug!(id = %id, delta = %delta, "Adjusting quantity");

        let sql = format!(
            "UPDATE products SET quantity = quantity + ?2 \
             WHERE id = ?1 AND quantity + ?2 >= 0 {RETURNING_PRODUCT}"
        );
        let row: Option<ProductRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(delta)
            .fetch_optional(&mut *conn)
            .await?;

        if let Some(row) = row {
            return Ok(row.into());
        }

        match Self::fetch(conn, id).await? {
            None => Err(DbError::not_found("Product", id)),
            Some(current) => match validate_stock_adjustment(id, current.quantity, delta) {
                Err(rule) => Err(DbError::Rule(rule)),
                Ok(_) => Err(DbError::Internal(format!(
                    "quantity update for product {id} matched no row"
                ))),
            },
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Domain Types
//!
//! Core domain types used throughout Stockbook.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Current state (mutable)       Ledger (append-only)                     │
//! │  ┌─────────────────┐           ┌─────────────────┐  ┌─────────────────┐ │
//! │  │    Product      │◄ ─ ─ ─ ─ ─│  RestockLine    │  │    SaleLine     │ │
//! │  │  ─────────────  │  weak ref │  snapshot +qty  │  │  snapshot +qty  │ │
//! │  │  id (i64)       │  (may be  └────────┬────────┘  └────────┬────────┘ │
//! │  │  name/brand/... │   NULL)            │ *                  │ *        │
//! │  │  price          │           ┌────────┴────────┐  ┌────────┴────────┐ │
//! │  │  quantity       │           │  RestockEvent   │  │   SaleEvent     │ │
//! │  │  threshold      │           │  occurred_at    │  │  total/payment  │ │
//! │  └─────────────────┘           └─────────────────┘  │  change         │ │
//! │                                                     └─────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! Ledger lines copy the product's identity fields at the time of the event.
//! Later edits or deletion of the product never rewrite history; deletion
//! only clears the line's `product_id`.

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// The authoritative stock record for one product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    /// Generated identifier.
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub size: String,
    #[serde(rename = "type")]
    pub product_type: String,
    /// Listed price.
    pub price: Money,
    /// Units on hand. Never negative.
    pub quantity: i64,
    /// Stock level below which the product needs restocking.
    pub restock_threshold: i64,
}

impl Product {
    /// Low-stock predicate used everywhere in Stockbook.
    ///
    /// Strictly less than: a product sitting exactly at its threshold is not
    /// low. The catalog's SQL filter uses the same comparison.
    #[inline]
    pub fn is_low_stock(&self) -> bool {
        self.quantity < self.restock_threshold
    }

    /// Checks whether `quantity` units can be taken from stock.
    #[inline]
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.quantity >= quantity
    }

    /// Identity fields copied into ledger lines.
    pub fn identity(&self) -> ProductIdentity {
        ProductIdentity {
            name: self.name.clone(),
            brand: self.brand.clone(),
            size: self.size.clone(),
            product_type: self.product_type.clone(),
        }
    }
}

/// Fields supplied when a product is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub brand: String,
    pub size: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub price: Money,
    pub quantity: i64,
    pub restock_threshold: i64,
}

/// Fields that may be edited on an existing product.
///
/// Stock level is deliberately absent: quantity only changes through a
/// restock or a sale, so the ledger always explains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: String,
    pub brand: String,
    pub size: String,
    #[serde(rename = "type")]
    pub product_type: String,
    pub price: Money,
    pub restock_threshold: i64,
}

impl From<&Product> for ProductUpdate {
    fn from(product: &Product) -> Self {
        ProductUpdate {
            name: product.name.clone(),
            brand: product.brand.clone(),
            size: product.size.clone(),
            product_type: product.product_type.clone(),
            price: product.price,
            restock_threshold: product.restock_threshold,
        }
    }
}

/// Product identity frozen into a ledger line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductIdentity {
    pub name: String,
    pub brand: String,
    pub size: String,
    #[serde(rename = "type")]
    pub product_type: String,
}

// =============================================================================
// Event Time
// =============================================================================

/// Timestamp of a ledger event.
///
/// Stored as separate year / month / day / time text columns so history can
/// be grouped by period; [`EventTime::decompose`] and
/// [`EventTime::compose`] convert between the two forms losslessly at
/// second granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventTime(NaiveDateTime);

/// The four stored parts of an [`EventTime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTimeParts {
    /// Four digits, e.g. `"2024"`.
    pub year: String,
    /// Two digits, `"01"`..`"12"`.
    pub month: String,
    /// Two digits, `"01"`..`"31"`.
    pub day: String,
    /// `"HH:MM:SS"`, 24-hour clock.
    pub time: String,
}

impl EventTime {
    /// Wraps a timestamp, truncating sub-second precision.
    pub fn new(at: NaiveDateTime) -> Self {
        EventTime(at.with_nanosecond(0).unwrap_or(at))
    }

    /// The current local wall-clock time.
    pub fn now() -> Self {
        EventTime::new(chrono::Local::now().naive_local())
    }

    pub fn as_datetime(&self) -> NaiveDateTime {
        self.0
    }

    pub fn decompose(&self) -> EventTimeParts {
        EventTimeParts {
            year: format!("{:04}", self.0.year()),
            month: format!("{:02}", self.0.month()),
            day: format!("{:02}", self.0.day()),
            time: self.0.format("%H:%M:%S").to_string(),
        }
    }

    /// Rebuilds a timestamp from stored parts. `None` if any part is malformed.
    pub fn compose(year: &str, month: &str, day: &str, time: &str) -> Option<Self> {
        let date = NaiveDate::from_ymd_opt(
            year.trim().parse().ok()?,
            month.trim().parse().ok()?,
            day.trim().parse().ok()?,
        )?;
        let time = NaiveTime::parse_from_str(time.trim(), "%H:%M:%S").ok()?;
        Some(EventTime(date.and_time(time)))
    }
}

impl From<NaiveDateTime> for EventTime {
    fn from(at: NaiveDateTime) -> Self {
        EventTime::new(at)
    }
}

// =============================================================================
// Restock Ledger
// =============================================================================

/// One restock: a delivery of one or more products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockEvent {
    pub id: i64,
    #[ts(as = "String")]
    pub occurred_at: EventTime,
    pub lines: Vec<RestockLine>,
}

impl RestockEvent {
    /// Total units received across all lines.
    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// A restocked product, frozen at restock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockLine {
    pub id: i64,
    pub restock_id: i64,
    /// `None` once the product has been deleted.
    pub product_id: Option<i64>,
    #[serde(flatten)]
    pub identity: ProductIdentity,
    pub price: Money,
    pub quantity: i64,
}

/// A restock line ready to be appended, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestockLineDraft {
    pub product_id: i64,
    pub identity: ProductIdentity,
    pub price: Money,
    pub quantity: i64,
}

// =============================================================================
// Sale Ledger
// =============================================================================

/// One completed sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleEvent {
    pub id: i64,
    #[ts(as = "String")]
    pub occurred_at: EventTime,
    pub total: Money,
    pub payment: Money,
    pub change: Money,
    pub lines: Vec<SaleLine>,
}

impl SaleEvent {
    /// Total units sold across all lines.
    pub fn total_units(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

/// A sold product, frozen at sale time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLine {
    pub id: i64,
    pub sale_id: i64,
    /// `None` once the product has been deleted.
    pub product_id: Option<i64>,
    #[serde(flatten)]
    pub identity: ProductIdentity,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// A sale line ready to be appended, already validated and priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaleLineDraft {
    pub product_id: i64,
    pub identity: ProductIdentity,
    pub quantity: i64,
    pub unit_price: Money,
    pub line_total: Money,
}

/// Persisted amounts of a sale.
///
/// `change + total == payment` always holds exactly, because `total` and
/// `payment` are both on the cent grid when change is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleTotals {
    pub total: Money,
    pub payment: Money,
    pub change: Money,
}

/// Aggregate of the sales recorded in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub year: i32,
    pub month: u32,
    pub sale_count: i64,
    pub units_sold: i64,
    pub revenue: Money,
}

// =============================================================================
// Requests (from the UI layer)
// =============================================================================

/// One product + quantity pair of a restock request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RestockLineRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockRequest {
    pub lines: Vec<RestockLineRequest>,
}

impl RestockRequest {
    /// Builds a request from `(product_id, quantity)` pairs.
    pub fn from_pairs(pairs: &[(i64, i64)]) -> Self {
        RestockRequest {
            lines: pairs
                .iter()
                .map(|&(product_id, quantity)| RestockLineRequest {
                    product_id,
                    quantity,
                })
                .collect(),
        }
    }
}

/// One line of a sale request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleLineRequest {
    pub product_id: i64,
    pub quantity: i64,
    /// Price charged per unit; may differ from the listed price.
    #[ts(type = "string")]
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleRequest {
    pub lines: Vec<SaleLineRequest>,
    /// Amount tendered by the customer.
    #[ts(type = "string")]
    pub payment: Decimal,
}

impl SaleRequest {
    /// Builds a request from `(product_id, quantity, unit_price)` triples.
    pub fn new(lines: &[(i64, i64, Decimal)], payment: Decimal) -> Self {
        SaleRequest {
            lines: lines
                .iter()
                .map(|&(product_id, quantity, unit_price)| SaleLineRequest {
                    product_id,
                    quantity,
                    unit_price,
                })
                .collect(),
            payment,
        }
    }
}

// =============================================================================
// Responses (to the UI layer)
// =============================================================================

/// Result of a committed restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RestockOutcome {
    pub event: RestockEvent,
    /// Post-commit state of every product the request touched.
    pub products: Vec<Product>,
}

/// Result of a committed sale; `event` carries everything a receipt needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleOutcome {
    pub event: SaleEvent,
    /// Post-commit state of every product the request touched.
    pub products: Vec<Product>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn product(quantity: i64, threshold: i64) -> Product {
        Product {
            id: 1,
            name: "Cola".to_string(),
            brand: "Fizz".to_string(),
            size: "330ml".to_string(),
            product_type: "Beverage".to_string(),
            price: Money::from_cents(999),
            quantity,
            restock_threshold: threshold,
        }
    }

    #[test]
    fn test_low_stock_is_strict() {
        assert!(product(4, 5).is_low_stock());
        assert!(!product(5, 5).is_low_stock());
        assert!(!product(6, 5).is_low_stock());
    }

    #[test]
    fn test_can_sell() {
        let p = product(10, 5);
        assert!(p.can_sell(10));
        assert!(!p.can_sell(11));
    }

    #[test]
    fn test_event_time_round_trip() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_milli_opt(9, 5, 1, 750)
            .unwrap();
        let time = EventTime::new(at);
        let parts = time.decompose();

        assert_eq!(parts.year, "2024");
        assert_eq!(parts.month, "03");
        assert_eq!(parts.day, "07");
        assert_eq!(parts.time, "09:05:01");
        assert_eq!(
            EventTime::compose(&parts.year, &parts.month, &parts.day, &parts.time),
            Some(time)
        );
    }

    #[test]
    fn test_event_time_rejects_garbage() {
        assert!(EventTime::compose("2024", "13", "01", "10:00:00").is_none());
        assert!(EventTime::compose("2024", "01", "01", "noon").is_none());
    }

    #[test]
    fn test_product_serializes_type_field() {
        let json = serde_json::to_value(product(1, 1)).unwrap();
        assert_eq!(json["type"], "Beverage");
        assert_eq!(json["price"], 999);
    }

    #[test]
    fn test_sale_request_from_json() {
        let json = r#"{"lines":[{"productId":1,"quantity":3,"unitPrice":"9.99"}],"payment":"30.00"}"#;
        let request: SaleRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.lines[0].unit_price, Decimal::new(999, 2));
        assert_eq!(request.payment, Decimal::new(3000, 2));
    }
}

//! # Validation Module
//!
//! Business rule checks run before any stock or ledger row is touched.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: UI layer (outside this workspace)                            │
//! │  └── Immediate feedback on obviously bad input                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE (pure, called by the Coordinator)                │
//! │  ├── every line checked, every failure collected                       │
//! │  └── payment checked against the rounded total                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: SQLite                                                       │
//! │  ├── CHECK (quantity >= 0), CHECK (price_cents >= 0), ...              │
//! │  └── Foreign keys with CASCADE / SET NULL                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Single-rule checks return [`ValidationResult`]. The planners
//! ([`plan_restock`], [`plan_sale`]) run every check over a whole request and
//! either return drafts ready to append or the full list of [`Violations`].

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::error::{ValidationError, Violation, Violations};
use crate::money::Money;
use crate::types::{
    NewProduct, Product, ProductUpdate, RestockLineDraft, RestockRequest, SaleLineDraft,
    SaleRequest, SaleTotals,
};
use crate::MAX_REQUEST_LINES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Product Field Validators
// =============================================================================

fn check_text(field: &str, value: &str, violations: &mut Violations) {
    if value.trim().is_empty() {
        violations.push(Violation::request(ValidationError::incomplete(field)));
    }
}

fn check_common_fields(
    name: &str,
    brand: &str,
    size: &str,
    product_type: &str,
    price: Money,
    restock_threshold: i64,
) -> Violations {
    let mut violations = Violations::new();
    check_text("name", name, &mut violations);
    check_text("brand", brand, &mut violations);
    check_text("size", size, &mut violations);
    check_text("type", product_type, &mut violations);
    if price.is_negative() {
        violations.push(Violation::request(ValidationError::incomplete("price")));
    }
    if restock_threshold < 0 {
        violations.push(Violation::request(ValidationError::incomplete(
            "restock_threshold",
        )));
    }
    violations
}

/// Validates the fields of a product about to be created.
///
/// ## Rules
/// - name, brand, size, type must not be blank
/// - price and restock threshold must be >= 0
/// - initial quantity must be >= 0
///
/// ## Example
/// ```rust
/// use stockbook_core::{Money, NewProduct};
/// use stockbook_core::validation::validate_new_product;
///
/// let mut product = NewProduct {
///     name: "Cola".into(), brand: "Fizz".into(), size: "330ml".into(),
///     product_type: "Beverage".into(), price: Money::from_cents(199),
///     quantity: 10, restock_threshold: 5,
/// };
/// assert!(validate_new_product(&product).is_ok());
///
/// product.brand = "  ".into();
/// assert!(validate_new_product(&product).is_err());
/// ```
pub fn validate_new_product(product: &NewProduct) -> Result<(), Violations> {
    let mut violations = check_common_fields(
        &product.name,
        &product.brand,
        &product.size,
        &product.product_type,
        product.price,
        product.restock_threshold,
    );
    if product.quantity < 0 {
        violations.push(Violation::request(ValidationError::NegativeStock {
            product_id: 0,
            current: 0,
            delta: product.quantity,
        }));
    }
    violations.into_result()
}

/// Validates an edit to an existing product's descriptive fields.
pub fn validate_product_update(update: &ProductUpdate) -> Result<(), Violations> {
    check_common_fields(
        &update.name,
        &update.brand,
        &update.size,
        &update.product_type,
        update.price,
        update.restock_threshold,
    )
    .into_result()
}

/// Checks that a stored product is complete enough to be snapshotted.
///
/// Reports the first offending field.
pub fn validate_snapshot_fields(product: &Product) -> ValidationResult<()> {
    let text_fields = [
        ("name", &product.name),
        ("brand", &product.brand),
        ("size", &product.size),
        ("type", &product.product_type),
    ];
    if let Some((field, _)) = text_fields.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(ValidationError::incomplete(*field));
    }
    if product.price.is_negative() {
        return Err(ValidationError::incomplete("price"));
    }
    if product.quantity < 0 {
        return Err(ValidationError::incomplete("quantity"));
    }
    if product.restock_threshold < 0 {
        return Err(ValidationError::incomplete("restock_threshold"));
    }
    Ok(())
}

// =============================================================================
// Line Validators
// =============================================================================

/// Validates a quantity on a restock or sale line.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_quantity(quantity: i64) -> ValidationResult<()> {
    if quantity <= 0 {
        return Err(ValidationError::InvalidQuantity { quantity });
    }
    Ok(())
}

/// Validates one restock line.
///
/// ## Checks (first failure wins)
/// 1. quantity > 0 → else `InvalidQuantity`
/// 2. product exists → else `MissingProduct`
/// 3. product fields are complete → else `IncompleteProductFields`
pub fn validate_restock_line(
    product_id: i64,
    product: Option<&Product>,
    quantity: i64,
) -> ValidationResult<()> {
    validate_quantity(quantity)?;
    let product = product.ok_or(ValidationError::MissingProduct { product_id })?;
    validate_snapshot_fields(product)
}

/// Validates one sale line.
///
/// `reserved` is the number of units of the same product already claimed by
/// earlier lines of the same request, so two lines cannot jointly oversell.
///
/// ## Checks (first failure wins)
/// 1. quantity > 0 → else `InvalidQuantity`
/// 2. product exists → else `MissingProduct`
/// 3. `product.quantity - reserved >= quantity` → else `InsufficientStock`
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Sale form: Cola × 15                                                   │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_sale_line(1, Some(&cola), 15, 0) ← THIS FUNCTION              │
/// │       │                                                                 │
/// │       ├── qty <= 0?            → InvalidQuantity                        │
/// │       ├── product deleted?     → MissingProduct                         │
/// │       ├── only 10 on hand?     → InsufficientStock                      │
/// │       │                                                                 │
/// │       └── OK → line joins the sale plan                                 │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_sale_line(
    product_id: i64,
    product: Option<&Product>,
    quantity: i64,
    reserved: i64,
) -> ValidationResult<()> {
    validate_quantity(quantity)?;
    let product = product.ok_or(ValidationError::MissingProduct { product_id })?;
    let available = product.quantity - reserved;
    if available < quantity {
        return Err(ValidationError::InsufficientStock {
            product_id,
            available,
            requested: quantity,
        });
    }
    Ok(())
}

/// Validates a caller-supplied unit price and rounds it to cents.
pub fn validate_unit_price(unit_price: Decimal) -> ValidationResult<Money> {
    let invalid = || ValidationError::InvalidAmount {
        field: "unit_price".to_string(),
        value: unit_price.to_string(),
    };
    if unit_price.is_sign_negative() && !unit_price.is_zero() {
        return Err(invalid());
    }
    Money::round_half_up(unit_price).ok_or_else(invalid)
}

/// Validates that a stock adjustment keeps the product non-negative.
///
/// Returns the resulting quantity.
pub fn validate_stock_adjustment(
    product_id: i64,
    current: i64,
    delta: i64,
) -> ValidationResult<i64> {
    match current.checked_add(delta) {
        Some(next) if next >= 0 => Ok(next),
        Some(_) => Err(ValidationError::NegativeStock {
            product_id,
            current,
            delta,
        }),
        None => Err(ValidationError::InvalidQuantity { quantity: delta }),
    }
}

/// Validates the number of lines in a request.
pub fn validate_line_count(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::EmptyRequest);
    }
    if lines > MAX_REQUEST_LINES {
        return Err(ValidationError::TooManyLines {
            max: MAX_REQUEST_LINES,
        });
    }
    Ok(())
}

// =============================================================================
// Payment
// =============================================================================

/// Checks that a payment covers a total.
pub fn validate_payment(total: Money, payment: Money) -> ValidationResult<()> {
    if payment < total {
        return Err(ValidationError::InsufficientPayment { total, payment });
    }
    Ok(())
}

/// Rounds a sale's unrounded subtotal and tendered payment and derives change.
///
/// ## Rounding
/// `total = round2(subtotal)`, `payment = round2(tendered)`,
/// `change = payment - total`. Both operands are already on the cent grid,
/// so `change + total == round2(tendered)` exactly.
///
/// ## Example
/// ```rust
/// use std::str::FromStr;
/// use rust_decimal::Decimal;
/// use stockbook_core::validation::settle_payment;
///
/// let subtotal = Decimal::from_str("29.97").unwrap();
/// let tendered = Decimal::from_str("30.00").unwrap();
/// let totals = settle_payment(subtotal, tendered).unwrap();
/// assert_eq!(totals.change.cents(), 3);
/// ```
pub fn settle_payment(subtotal: Decimal, tendered: Decimal) -> ValidationResult<SaleTotals> {
    let total = Money::round_half_up(subtotal).ok_or_else(|| ValidationError::InvalidAmount {
        field: "total".to_string(),
        value: subtotal.to_string(),
    })?;
    let payment = match Money::round_half_up(tendered) {
        Some(payment) if !payment.is_negative() => payment,
        _ => {
            return Err(ValidationError::InvalidAmount {
                field: "payment".to_string(),
                value: tendered.to_string(),
            })
        }
    };
    validate_payment(total, payment)?;
    Ok(SaleTotals {
        total,
        payment,
        change: payment - total,
    })
}

// =============================================================================
// Request Planning
// =============================================================================

/// Validates a restock request against current product state.
///
/// On success returns one draft per request line, each carrying the
/// product's current snapshot. On failure returns every violation found.
pub fn plan_restock(
    request: &RestockRequest,
    products: &HashMap<i64, Product>,
) -> Result<Vec<RestockLineDraft>, Violations> {
    let mut violations = Violations::new();
    if let Err(e) = validate_line_count(request.lines.len()) {
        violations.push(Violation::request(e));
        return Err(violations);
    }

    // Stock each product will hold once the earlier lines are applied.
    let mut pending: HashMap<i64, i64> = HashMap::new();
    let mut drafts = Vec::with_capacity(request.lines.len());
    for (index, line) in request.lines.iter().enumerate() {
        let product = products.get(&line.product_id);
        let checked = validate_restock_line(line.product_id, product, line.quantity).and_then(|()| {
            match product {
                Some(product) => {
                    let current = pending.get(&product.id).copied().unwrap_or(product.quantity);
                    validate_stock_adjustment(product.id, current, line.quantity).map(Some)
                }
                None => Ok(None),
            }
        });
        match checked {
            Ok(next) => {
                if let (Some(product), Some(next)) = (product, next) {
                    pending.insert(product.id, next);
                    drafts.push(RestockLineDraft {
                        product_id: product.id,
                        identity: product.identity(),
                        price: product.price,
                        quantity: line.quantity,
                    });
                }
            }
            Err(e) => violations.push(Violation::at_line(index, e)),
        }
    }

    violations.into_result().map(|()| drafts)
}

/// Validates and prices a sale request against current product state.
///
/// Line totals are rounded individually for the ledger, but the sale total
/// is rounded once from the exact sum of `unit_price × quantity`.
pub fn plan_sale(
    request: &SaleRequest,
    products: &HashMap<i64, Product>,
) -> Result<(Vec<SaleLineDraft>, SaleTotals), Violations> {
    let mut violations = Violations::new();
    if let Err(e) = validate_line_count(request.lines.len()) {
        violations.push(Violation::request(e));
        return Err(violations);
    }

    let mut reserved: HashMap<i64, i64> = HashMap::new();
    let mut subtotal = Decimal::ZERO;
    let mut drafts = Vec::with_capacity(request.lines.len());

    for (index, line) in request.lines.iter().enumerate() {
        let product = products.get(&line.product_id);
        let claimed = reserved.get(&line.product_id).copied().unwrap_or(0);

        let priced = validate_sale_line(line.product_id, product, line.quantity, claimed)
            .and_then(|()| validate_unit_price(line.unit_price))
            .and_then(|unit_price| {
                let exact = line
                    .unit_price
                    .checked_mul(Decimal::from(line.quantity))
                    .ok_or_else(|| ValidationError::InvalidAmount {
                        field: "line_total".to_string(),
                        value: format!("{} × {}", line.unit_price, line.quantity),
                    })?;
                let line_total =
                    Money::round_half_up(exact).ok_or_else(|| ValidationError::InvalidAmount {
                        field: "line_total".to_string(),
                        value: exact.to_string(),
                    })?;
                Ok((unit_price, exact, line_total))
            });

        let priced = priced.and_then(|(unit_price, exact, line_total)| {
            let running = subtotal.checked_add(exact).ok_or_else(|| ValidationError::InvalidAmount {
                field: "total".to_string(),
                value: format!("{} + {}", subtotal, exact),
            })?;
            Ok((unit_price, running, line_total))
        });

        match (priced, product) {
            (Ok((unit_price, running, line_total)), Some(product)) => {
                *reserved.entry(product.id).or_insert(0) += line.quantity;
                subtotal = running;
                drafts.push(SaleLineDraft {
                    product_id: product.id,
                    identity: product.identity(),
                    quantity: line.quantity,
                    unit_price,
                    line_total,
                });
            }
            (Err(e), _) => violations.push(Violation::at_line(index, e)),
            (Ok(_), None) => {}
        }
    }

    // Payment is judged against the lines that priced cleanly, so a bad line
    // does not also produce a misleading payment error.
    match settle_payment(subtotal, request.payment) {
        Ok(totals) => violations.into_result().map(|()| (drafts, totals)),
        Err(e) => {
            violations.push(Violation::request(e));
            Err(violations)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

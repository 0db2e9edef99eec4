//! # Seed Data Generator
//!
//! Populates a database with a demo catalog, an admin account, and a little
//! history so every screen has something to show.
//!
//! ## Usage
//! ```bash
//! # Uses STOCKBOOK_DB_PATH, or ./stockbook.db
//! cargo run -p stockbook-db --bin seed
//!
//! # Specify database path and admin password
//! cargo run -p stockbook-db --bin seed -- --db ./data/shop.db --admin-password s3cret
//! ```
//!
//! Everything is written through the Coordinator, so the seeded history
//! obeys the same rules as real usage.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use stockbook_core::{EventTime, Money, NewProduct, RestockRequest, Role, SaleRequest};
use stockbook_db::{Coordinator, Database, DbConfig};

/// (name, brand, size, type, price in cents, threshold)
const CATALOG: &[(&str, &str, &str, &str, i64, i64)] = &[
    ("Cola", "Fizz", "330ml", "Beverage", 129, 24),
    ("Sparkling Water", "Clearspring", "500ml", "Beverage", 99, 24),
    ("Orange Juice", "Sunny", "1L", "Beverage", 299, 10),
    ("Potato Chips", "Crunchy", "150g", "Snack", 249, 12),
    ("Dark Chocolate", "Cacao & Co", "100g", "Snack", 349, 10),
    ("Whole Milk", "Meadow", "1L", "Dairy", 159, 15),
    ("Cheddar", "Meadow", "250g", "Dairy", 449, 6),
    ("Basmati Rice", "Grainhouse", "1kg", "Grocery", 399, 8),
    ("Spaghetti", "Nonna", "500g", "Grocery", 179, 10),
    ("Dish Soap", "Sparkle", "750ml", "Household", 289, 5),
];

struct Args {
    db_path: Option<String>,
    admin_password: String,
}

fn parse_args() -> Option<Args> {
    let args: Vec<String> = env::args().collect();
    let mut parsed = Args {
        db_path: None,
        admin_password: env::var("STOCKBOOK_ADMIN_PASSWORD").unwrap_or_else(|_| "admin".to_string()),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    parsed.db_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--admin-password" => {
                if i + 1 < args.len() {
                    parsed.admin_password = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Stockbook Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>            Database file path (default: $STOCKBOOK_DB_PATH or ./stockbook.db)");
                println!("      --admin-password <PW>  Password for the 'admin' account (default: $STOCKBOOK_ADMIN_PASSWORD or 'admin')");
                println!("  -h, --help                 Show this help message");
                return None;
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    Some(parsed)
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockbook=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let Some(args) = parse_args() else {
        return Ok(());
    };

    let config = match args.db_path {
        Some(path) => DbConfig::new(path),
        None => DbConfig::from_env()?,
    };
    info!(path = %config.database_path.display(), "Seeding database");

    let db = Database::new(config).await?;
    let coordinator = Coordinator::new(db.clone());

    if db.catalog().count().await? > 0 {
        warn!("Database already has products; skipping seed. Delete the file to regenerate.");
        return Ok(());
    }

    if db.users().list_users().await?.is_empty() {
        db.users()
            .create_user("admin", &args.admin_password, Role::Admin)
            .await?;
    }

    let mut ids = Vec::with_capacity(CATALOG.len());
    for &(name, brand, size, product_type, price_cents, threshold) in CATALOG {
        let product = coordinator
            .add_product(&NewProduct {
                name: name.to_string(),
                brand: brand.to_string(),
                size: size.to_string(),
                product_type: product_type.to_string(),
                price: Money::from_cents(price_cents),
                quantity: 0,
                restock_threshold: threshold,
            })
            .await?;
        ids.push(product.id);
    }
    info!(count = ids.len(), "Catalog created");

    // Opening delivery: twice each threshold, except the last product which
    // is left short so the low-stock report has an entry.
    let pairs: Vec<(i64, i64)> = ids
        .iter()
        .zip(CATALOG)
        .enumerate()
        .map(|(i, (&id, &(.., threshold)))| {
            let quantity = if i + 1 == ids.len() { threshold / 2 + 1 } else { threshold * 2 };
            (id, quantity)
        })
        .collect();
    let restock = coordinator
        .apply_restock(EventTime::now(), &RestockRequest::from_pairs(&pairs))
        .await?;
    info!(units = restock.event.total_units(), "Opening stock received");

    // One sample sale at list price.
    let cola = coordinator.product(ids[0]).await?;
    let chips = coordinator.product(ids[3]).await?;
    let sale = SaleRequest::new(
        &[
            (cola.id, 2, cola.price.to_decimal()),
            (chips.id, 1, chips.price.to_decimal()),
        ],
        Decimal::from_str("10.00")?,
    );
    let outcome = coordinator.apply_sale(EventTime::now(), &sale).await?;
    info!(
        total = %outcome.event.total,
        change = %outcome.event.change,
        "Sample sale recorded"
    );

    let low = coordinator.low_stock().await?;
    info!(low_stock = low.len(), "Seed complete");

    db.close().await;
    Ok(())
}

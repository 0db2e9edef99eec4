//! # Access Policy
//!
//! Static role → operation table. The UI asks [`can_perform`] before showing
//! an action, and the Coordinator asks again before running it.
//!
//! ```text
//! ┌───────────────────────┬───────┬───────────────┬───────────────────┬───────────┬─────────┐
//! │ Operation             │ admin │ store_manager │ inventory_manager │ restocker │ cashier │
//! ├───────────────────────┼───────┼───────────────┼───────────────────┼───────────┼─────────┤
//! │ ViewCatalog           │   ✓   │       ✓       │         ✓         │     ✓     │    ✓    │
//! │ Add/Update/Delete     │   ✓   │       ✓       │         ✓         │           │         │
//! │ Restock               │   ✓   │       ✓       │         ✓         │     ✓     │         │
//! │ Sell                  │   ✓   │       ✓       │                   │           │    ✓    │
//! │ ViewRestockHistory    │   ✓   │       ✓       │         ✓         │     ✓     │         │
//! │ ViewSaleHistory       │   ✓   │       ✓       │                   │           │    ✓    │
//! │ Delete*History        │   ✓   │       ✓       │                   │           │         │
//! │ ManageUsers           │   ✓   │               │                   │           │         │
//! └───────────────────────┴───────┴───────────────┴───────────────────┴───────────┴─────────┘
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A user's role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Cashier,
    StoreManager,
    InventoryManager,
    Restocker,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Cashier,
        Role::StoreManager,
        Role::InventoryManager,
        Role::Restocker,
    ];

    /// The stored form of the role (`users.role` column).
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
            Role::StoreManager => "store_manager",
            Role::InventoryManager => "inventory_manager",
            Role::Restocker => "restocker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string names no known role.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Something a user can ask the Coordinator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ViewCatalog,
    AddProduct,
    UpdateProduct,
    DeleteProduct,
    Restock,
    Sell,
    ViewRestockHistory,
    ViewSaleHistory,
    DeleteSaleHistory,
    DeleteRestockHistory,
    ManageUsers,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::ViewCatalog => "view_catalog",
            Operation::AddProduct => "add_product",
            Operation::UpdateProduct => "update_product",
            Operation::DeleteProduct => "delete_product",
            Operation::Restock => "restock",
            Operation::Sell => "sell",
            Operation::ViewRestockHistory => "view_restock_history",
            Operation::ViewSaleHistory => "view_sale_history",
            Operation::DeleteSaleHistory => "delete_sale_history",
            Operation::DeleteRestockHistory => "delete_restock_history",
            Operation::ManageUsers => "manage_users",
        };
        f.write_str(name)
    }
}

/// Returns whether `role` may invoke `operation`.
pub const fn can_perform(role: Role, operation: Operation) -> bool {
    use Operation::*;

    match role {
        Role::Admin => true,
        Role::StoreManager => !matches!(operation, ManageUsers),
        Role::InventoryManager => matches!(
            operation,
            ViewCatalog | AddProduct | UpdateProduct | DeleteProduct | Restock | ViewRestockHistory
        ),
        Role::Restocker => matches!(operation, ViewCatalog | Restock | ViewRestockHistory),
        Role::Cashier => matches!(operation, ViewCatalog | Sell | ViewSaleHistory),
    }
}

//! Built-in role → permission mapping.

use crate::{Permission, Role};

/// Permissions granted by a built-in role. Unknown roles grant nothing.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    let names: &[&'static str] = match role.as_str() {
        "owner" | "admin" => &["*"],
        "manager" => &[
            "pos.*",
            "products.*",
            "stock.*",
            "purchases.*",
            "debts.*",
            "ledger.read",
            "ledger.post",
        ],
        "cashier" => &["pos.*", "products.read", "stock.read"],
        "accountant" => &["ledger.*", "debts.*", "purchases.read", "products.read", "stock.read"],
        _ => &[],
    };
    names.iter().map(|n| Permission::new(*n)).collect()
}

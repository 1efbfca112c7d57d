//! Table names in the backing store.

pub const USERS: &str = "users";
pub const CHALLENGES: &str = "challenges";
pub const PRODUCTS: &str = "products";
pub const ORDERS: &str = "orders";
pub const FLASH_SALES: &str = "flash_sales";
pub const RETURNS: &str = "returns";
pub const REPORTS: &str = "reports";

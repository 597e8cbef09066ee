//! Domain models for the storefront.

pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use order::{
    DailyOrderTotals, NewOrder, Order, OrderFilter, OrderItem, OrderUpdate, Payment,
    PaymentConfirmation, ShippingAddress, StockPolicy, StockShortfall, format_order_number,
};
pub use product::{Product, ProductCounts, ProductDraft, ProductFilter};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{NewUser, User, UserCounts, UserFilter};

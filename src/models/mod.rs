// Core models
pub mod order;
pub mod requester;

pub use order::{NewOrder, NewOrderItem, Order, OrderItem, OrderStatus};
pub use requester::{Requester, Role};

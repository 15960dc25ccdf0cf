use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Enum representing the possible statuses of an order.
///
/// The numeric id (1-7) is the wire representation used by the status table
/// and by status update requests.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Processed,
    Shipped,
    ReachedHub,
    OutForDelivery,
    Delivered,
    Canceled,
}

impl OrderStatus {
    /// 1-indexed ordinal of the status.
    pub fn id(self) -> u8 {
        match self {
            Self::Placed => 1,
            Self::Processed => 2,
            Self::Shipped => 3,
            Self::ReachedHub => 4,
            Self::OutForDelivery => 5,
            Self::Delivered => 6,
            Self::Canceled => 7,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::iter().find(|status| status.id() == id)
    }

    /// Human readable label, e.g. `REACHED HUB`.
    pub fn label(self) -> &'static str {
        match self {
            Self::Placed => "PLACED",
            Self::Processed => "PROCESSED",
            Self::Shipped => "SHIPPED",
            Self::ReachedHub => "REACHED HUB",
            Self::OutForDelivery => "OUT FOR DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Canceled)
    }

    /// All statuses in ordinal order.
    pub fn all() -> Vec<Self> {
        Self::iter().collect()
    }
}

/// A single line of an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrderItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    /// Saturates at `Decimal::MAX`; [`NewOrder::total`] rejects such orders first.
    pub fn line_total(&self) -> Decimal {
        self.unit_price.saturating_mul(Decimal::from(self.quantity))
    }
}

/// An order record as held by the order store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Primary key, assigned at creation.
    pub id: Uuid,

    /// Customer who placed the order.
    pub customer_id: Uuid,

    /// Ordered line items. Immutable after creation.
    pub items: Vec<OrderItem>,

    /// Sum of the line totals, computed at creation.
    pub total_amount: Decimal,

    /// Delivery address.
    pub address: String,

    /// Delivery contact phone.
    pub phone: String,

    /// Current status of the order.
    pub status: OrderStatus,

    /// Delivery agent assigned by an admin, if any.
    pub assigned_agent_id: Option<Uuid>,

    /// Optimistic concurrency counter, bumped on every write.
    pub version: i64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a freshly placed order for `customer_id`.
    pub fn place(customer_id: Uuid, new_order: NewOrder) -> Self {
        let now = Utc::now();
        let items: Vec<OrderItem> = new_order
            .items
            .into_iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect();
        let total_amount = items
            .iter()
            .fold(Decimal::ZERO, |acc, item| acc.saturating_add(item.line_total()));

        Self {
            id: Uuid::new_v4(),
            customer_id,
            items,
            total_amount,
            address: new_order.address.trim().to_string(),
            phone: new_order.phone.trim().to_string(),
            status: OrderStatus::Placed,
            assigned_agent_id: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Checkout payload for a new order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewOrder {
    #[validate(length(min = 1, message = "an order needs at least one item"))]
    pub items: Vec<NewOrderItem>,
    #[validate(custom = "validate_not_blank", length(max = 512))]
    pub address: String,
    #[validate(length(min = 7, max = 20, message = "phone must be 7 to 20 characters"))]
    pub phone: String,
}

impl NewOrder {
    /// Order total, or `None` if it does not fit in a `Decimal`.
    pub fn total(&self) -> Option<Decimal> {
        self.items.iter().try_fold(Decimal::ZERO, |acc, item| {
            item.unit_price
                .checked_mul(Decimal::from(item.quantity))
                .and_then(|line| acc.checked_add(line))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10000, message = "quantity must be between 1 and 10000"))]
    pub quantity: u32,
    #[validate(custom = "validate_unit_price")]
    pub unit_price: Decimal,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("address must not be blank".into());
        return Err(err);
    }
    Ok(())
}

fn validate_unit_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        let mut err = ValidationError::new("unit_price");
        err.message = Some("unit_price must not be negative".into());
        return Err(err);
    }
    Ok(())
}

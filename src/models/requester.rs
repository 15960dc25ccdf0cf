use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Roles recognised by the order lifecycle.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Admin,
    DeliveryAgent,
    Customer,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "agent" | "delivery_agent" | "deliveryagent" => Ok(Self::DeliveryAgent),
            "customer" => Ok(Self::Customer),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// The caller of an order mutation: who they are and in which role.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Requester {
    pub user_id: Uuid,
    pub role: Role,
}

impl Requester {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn agent(user_id: Uuid) -> Self {
        Self::new(user_id, Role::DeliveryAgent)
    }

    pub fn customer(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Customer)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

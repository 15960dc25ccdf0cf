use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::Order;

/// Persistence for order records.
///
/// Writes after creation go through [`OrderRepository::compare_and_swap`], so
/// two concurrent mutations of one order can never both succeed.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Stores a new order. Fails with `Conflict` if the id is taken.
    async fn insert(&self, order: Order) -> Result<Order, ServiceError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError>;

    /// Orders placed by a customer, newest first
    async fn find_by_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, ServiceError>;

    /// Orders currently assigned to a delivery agent, newest first
    async fn find_by_agent(&self, agent_id: Uuid) -> Result<Vec<Order>, ServiceError>;

    /// All orders, newest first
    async fn find_all(&self) -> Result<Vec<Order>, ServiceError>;

    /// Replaces the stored order if its version still equals `expected_version`.
    async fn compare_and_swap(
        &self,
        order: Order,
        expected_version: i64,
    ) -> Result<Order, ServiceError>;
}

/// In-process order store
#[derive(Debug, Default)]
pub struct InMemoryOrderRepository {
    orders: DashMap<Uuid, Order>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted<F>(&self, predicate: F) -> Vec<Order>
    where
        F: Fn(&Order) -> bool,
    {
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        orders
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<Order, ServiceError> {
        match self.orders.entry(order.id) {
            Entry::Occupied(_) => Err(ServiceError::Conflict(format!(
                "Order {} already exists",
                order.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(order.clone());
                Ok(order)
            }
        }
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, ServiceError> {
        Ok(self.orders.get(&id).map(|entry| entry.value().clone()))
    }

    async fn find_by_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        Ok(self.collect_sorted(|order| order.customer_id == customer_id))
    }

    async fn find_by_agent(&self, agent_id: Uuid) -> Result<Vec<Order>, ServiceError> {
        Ok(self.collect_sorted(|order| order.assigned_agent_id == Some(agent_id)))
    }

    async fn find_all(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.collect_sorted(|_| true))
    }

    async fn compare_and_swap(
        &self,
        order: Order,
        expected_version: i64,
    ) -> Result<Order, ServiceError> {
        // The shard lock is held for the whole check-and-write
        let mut stored = self
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order.id)))?;

        if stored.version != expected_version {
            return Err(ServiceError::ConcurrentModification(order.id));
        }

        *stored = order.clone();
        Ok(order)
    }
}

use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    metrics,
    models::{NewOrder, Order, OrderStatus, Requester, Role},
    repositories::OrderRepository,
    services::order_status::{self, TransitionError},
};

/// Reads and mutates orders on behalf of an authenticated requester.
///
/// Every status change and assignment is computed by
/// [`order_status`](crate::services::order_status) and then written with a
/// versioned compare-and-swap, so a request that raced another writer fails
/// with [`ServiceError::ConcurrentModification`] instead of overwriting it.
#[derive(Clone)]
pub struct OrderService {
    repo: Arc<dyn OrderRepository>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(repo: Arc<dyn OrderRepository>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { repo, event_sender }
    }

    /// Places a new order for the calling customer.
    #[instrument(skip(self, new_order), fields(customer_id = %requester.user_id))]
    pub async fn place_order(
        &self,
        requester: &Requester,
        new_order: NewOrder,
    ) -> Result<Order, ServiceError> {
        if requester.role != Role::Customer {
            return Err(ServiceError::Forbidden(
                "Only customers can place orders".into(),
            ));
        }

        new_order.validate()?;
        for item in &new_order.items {
            item.validate()?;
        }
        if new_order.total().is_none() {
            return Err(ServiceError::ValidationError(
                "order total is out of range".into(),
            ));
        }

        let order = self
            .repo
            .insert(Order::place(requester.user_id, new_order))
            .await?;

        metrics::ORDERS_CREATED.inc();
        info!(order_id = %order.id, total = %order.total_amount, "Order placed");

        self.publish(Event::OrderCreated {
            order_id: order.id,
            customer_id: order.customer_id,
        })
        .await;

        Ok(order)
    }

    /// Fetches one order the requester is allowed to see.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        requester: &Requester,
        order_id: Uuid,
    ) -> Result<Order, ServiceError> {
        let order = self.load(order_id).await?;
        if !order_status::can_view(&order, requester) {
            return Err(ServiceError::Forbidden(
                "Not allowed to view this order".into(),
            ));
        }
        Ok(order)
    }

    /// Every order in the store (admin only).
    #[instrument(skip(self))]
    pub async fn list_orders(&self, requester: &Requester) -> Result<Vec<Order>, ServiceError> {
        if !requester.is_admin() {
            return Err(ServiceError::Forbidden("Admin access required".into()));
        }
        self.repo.find_all().await
    }

    /// Orders placed by `customer_id`, visible to admins and to that customer.
    #[instrument(skip(self))]
    pub async fn orders_for_customer(
        &self,
        requester: &Requester,
        customer_id: Uuid,
    ) -> Result<Vec<Order>, ServiceError> {
        let allowed = match requester.role {
            Role::Admin => true,
            Role::Customer => requester.user_id == customer_id,
            Role::DeliveryAgent => false,
        };
        if !allowed {
            return Err(ServiceError::Forbidden(
                "Not allowed to view this customer's orders".into(),
            ));
        }
        self.repo.find_by_customer(customer_id).await
    }

    /// Work list of the calling delivery agent.
    #[instrument(skip(self))]
    pub async fn orders_for_agent(
        &self,
        requester: &Requester,
    ) -> Result<Vec<Order>, ServiceError> {
        if requester.role != Role::DeliveryAgent {
            return Err(ServiceError::Forbidden(
                "Only delivery agents have assigned orders".into(),
            ));
        }
        self.repo.find_by_agent(requester.user_id).await
    }

    /// Statuses the requester may move this order to right now.
    #[instrument(skip(self))]
    pub async fn next_statuses(
        &self,
        requester: &Requester,
        order_id: Uuid,
    ) -> Result<Vec<OrderStatus>, ServiceError> {
        let order = self.get_order(requester, order_id).await?;
        Ok(order_status::next_statuses(&order, requester))
    }

    /// Moves an order to `requested` if the lifecycle and role policy allow it.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        requester: &Requester,
        order_id: Uuid,
        requested: OrderStatus,
    ) -> Result<Order, ServiceError> {
        let current = self.load(order_id).await?;
        let updated = order_status::apply_transition(&current, requested, requester)
            .map_err(|e| rejected(order_id, e))?;

        let saved = self.repo.compare_and_swap(updated, current.version).await?;

        metrics::ORDER_STATUS_UPDATES.inc();
        info!(
            %order_id,
            old_status = %current.status,
            new_status = %saved.status,
            version = saved.version,
            "Order status updated"
        );

        let event = match saved.status {
            OrderStatus::Canceled => Event::OrderCancelled {
                order_id,
                cancelled_by: requester.user_id,
            },
            OrderStatus::Delivered => Event::OrderDelivered(order_id),
            new_status => Event::OrderStatusChanged {
                order_id,
                old_status: current.status,
                new_status,
                changed_by: requester.user_id,
            },
        };
        self.publish(event).await;

        Ok(saved)
    }

    /// Customer cancellation, through the same checks as any status change.
    pub async fn cancel_order(
        &self,
        requester: &Requester,
        order_id: Uuid,
    ) -> Result<Order, ServiceError> {
        self.update_status(requester, order_id, OrderStatus::Canceled)
            .await
    }

    /// Assigns (or reassigns) a delivery agent to a non-terminal order.
    #[instrument(skip(self))]
    pub async fn assign_agent(
        &self,
        requester: &Requester,
        order_id: Uuid,
        agent_id: Uuid,
    ) -> Result<Order, ServiceError> {
        let current = self.load(order_id).await?;
        let updated = order_status::assign_agent(&current, agent_id, requester)
            .map_err(|e| rejected(order_id, e))?;

        let saved = self.repo.compare_and_swap(updated, current.version).await?;

        metrics::AGENT_ASSIGNMENTS.inc();
        info!(%order_id, %agent_id, "Delivery agent assigned");

        self.publish(Event::AgentAssigned {
            order_id,
            agent_id,
            previous_agent_id: current.assigned_agent_id,
        })
        .await;

        Ok(saved)
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, ServiceError> {
        self.repo
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// The write is already committed, so a failed send is logged and counted only.
    async fn publish(&self, event: Event) {
        let Some(sender) = &self.event_sender else {
            return;
        };
        if let Err(e) = sender.send(event).await {
            metrics::EVENT_SEND_FAILURES.inc();
            error!(error = %e, "Failed to publish order event");
        }
    }
}

fn rejected(order_id: Uuid, err: TransitionError) -> ServiceError {
    metrics::record_rejection(err.kind());
    warn!(%order_id, kind = err.kind(), error = %err, "Order change rejected");
    err.into()
}

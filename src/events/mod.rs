use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::OrderStatus;

/// Domain events emitted after an order write has been committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        customer_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
        changed_by: Uuid,
    },
    OrderCancelled {
        order_id: Uuid,
        cancelled_by: Uuid,
    },
    OrderDelivered(Uuid),
    AgentAssigned {
        order_id: Uuid,
        agent_id: Uuid,
        previous_agent_id: Option<Uuid>,
    },
}

impl Event {
    pub fn order_id(&self) -> Uuid {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::OrderStatusChanged { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::AgentAssigned { order_id, .. } => *order_id,
            Event::OrderDelivered(order_id) => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderDelivered(_) => "order_delivered",
            Event::AgentAssigned { .. } => "agent_assigned",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// True once the event processor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                customer_id,
            } => {
                info!(%order_id, %customer_id, "Order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
                changed_by,
            } => {
                info!(
                    %order_id,
                    %old_status,
                    %new_status,
                    %changed_by,
                    "Order status changed"
                );
            }
            Event::OrderCancelled {
                order_id,
                cancelled_by,
            } => {
                warn!(%order_id, %cancelled_by, "Order cancelled");
            }
            Event::OrderDelivered(order_id) => {
                info!(%order_id, "Order delivered");
            }
            Event::AgentAssigned {
                order_id,
                agent_id,
                previous_agent_id,
            } => match previous_agent_id {
                Some(previous) => {
                    info!(%order_id, %agent_id, previous_agent_id = %previous, "Delivery agent reassigned")
                }
                None => info!(%order_id, %agent_id, "Delivery agent assigned"),
            },
        }
    }

    info!("Event channel closed, stopping event processing");
}

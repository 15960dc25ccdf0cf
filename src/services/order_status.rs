//! Order status state machine and the role policy for order mutations.
//!
//! Every surface that needs to know whether an order may move to another
//! status, or which statuses a caller may pick next, asks this module. The
//! functions here are pure: no I/O, no clock reads except for stamping
//! `updated_at` on a successfully transitioned copy.

use chrono::Utc;
use strum::IntoEnumIterator;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Order, OrderStatus, Requester, Role};

/// Why a requested order mutation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The requested status is not reachable from the current one.
    #[error("Cannot transition order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Agents cannot be assigned once the order is DELIVERED or CANCELED.
    #[error("Cannot assign a delivery agent to a {status} order")]
    AssignmentClosed { status: OrderStatus },

    /// The edge exists but the requester may not take it.
    #[error("{reason}")]
    Unauthorized { reason: String },
}

impl TransitionError {
    fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } | Self::AssignmentClosed { .. } => {
                "invalid_transition"
            }
            Self::Unauthorized { .. } => "unauthorized",
        }
    }
}

/// Validates if a status transition exists in the lifecycle table.
fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use crate::models::OrderStatus::*;

    match (from, to) {
        // Terminal states have no outgoing edges
        (Delivered | Canceled, _) => false,

        // Forward progress, one step at a time
        (Placed, Processed) => true,
        (Processed, Shipped) => true,
        (Shipped, ReachedHub) => true,
        (ReachedHub, OutForDelivery) => true,
        (OutForDelivery, Delivered) => true,

        // Any non-terminal order can be canceled
        (_, Canceled) => true,

        _ => false,
    }
}

/// Statuses from which a customer may still cancel.
fn customer_may_cancel(current: OrderStatus) -> bool {
    matches!(
        current,
        OrderStatus::Placed | OrderStatus::Processed | OrderStatus::Shipped
    )
}

fn role_permits(current: OrderStatus, requested: OrderStatus, role: Role) -> bool {
    match requested {
        OrderStatus::Canceled => role == Role::Customer && customer_may_cancel(current),
        _ => matches!(role, Role::Admin | Role::DeliveryAgent),
    }
}

/// Statuses directly reachable from `current`, ignoring who asks.
pub fn allowed_next(current: OrderStatus) -> Vec<OrderStatus> {
    OrderStatus::iter()
        .filter(|next| is_valid_transition(current, *next))
        .collect()
}

/// Role-level legality check.
///
/// A `DeliveryAgent` is treated as the agent assigned to the order; use
/// [`check_transition`] when the order itself is at hand.
pub fn can_transition(current: OrderStatus, requested: OrderStatus, role: Role) -> bool {
    is_valid_transition(current, requested) && role_permits(current, requested, role)
}

/// Full check of a status change against a concrete order.
///
/// The lifecycle table is consulted first, so leaving a terminal state is
/// always reported as [`TransitionError::InvalidTransition`].
pub fn check_transition(
    order: &Order,
    requested: OrderStatus,
    requester: &Requester,
) -> Result<(), TransitionError> {
    let current = order.status;
    if !is_valid_transition(current, requested) {
        return Err(TransitionError::InvalidTransition {
            from: current,
            to: requested,
        });
    }

    if !role_permits(current, requested, requester.role) {
        return Err(match (requested, requester.role) {
            (OrderStatus::Canceled, Role::Customer) => TransitionError::unauthorized(format!(
                "Order can no longer be canceled once it is {}",
                current.label()
            )),
            (OrderStatus::Canceled, _) => {
                TransitionError::unauthorized("Only the customer can cancel an order")
            }
            _ => TransitionError::unauthorized(format!(
                "A {} cannot move an order to {}",
                requester.role,
                requested.label()
            )),
        });
    }

    match requester.role {
        Role::DeliveryAgent if order.assigned_agent_id != Some(requester.user_id) => Err(
            TransitionError::unauthorized("Order is not assigned to this delivery agent"),
        ),
        Role::Customer if order.customer_id != requester.user_id => Err(
            TransitionError::unauthorized("Order belongs to another customer"),
        ),
        _ => Ok(()),
    }
}

/// Returns a copy of `order` moved to `requested`.
///
/// `order` is only borrowed, so a refused transition leaves it untouched.
pub fn apply_transition(
    order: &Order,
    requested: OrderStatus,
    requester: &Requester,
) -> Result<Order, TransitionError> {
    check_transition(order, requested, requester)?;

    let mut updated = order.clone();
    updated.status = requested;
    updated.version += 1;
    updated.updated_at = Utc::now();
    Ok(updated)
}

/// Returns a copy of `order` assigned to `agent_id`.
///
/// Reassignment is allowed any number of times until the order is terminal.
pub fn assign_agent(
    order: &Order,
    agent_id: Uuid,
    requester: &Requester,
) -> Result<Order, TransitionError> {
    if order.is_terminal() {
        return Err(TransitionError::AssignmentClosed { status: order.status });
    }
    if requester.role != Role::Admin {
        return Err(TransitionError::unauthorized(
            "Only an admin can assign a delivery agent",
        ));
    }

    let mut updated = order.clone();
    updated.assigned_agent_id = Some(agent_id);
    updated.version += 1;
    updated.updated_at = Utc::now();
    Ok(updated)
}

/// Statuses `requester` may request for `order` right now.
pub fn next_statuses(order: &Order, requester: &Requester) -> Vec<OrderStatus> {
    allowed_next(order.status)
        .into_iter()
        .filter(|next| check_transition(order, *next, requester).is_ok())
        .collect()
}

/// Whether `requester` may read `order`.
pub fn can_view(order: &Order, requester: &Requester) -> bool {
    match requester.role {
        Role::Admin => true,
        Role::DeliveryAgent => order.assigned_agent_id == Some(requester.user_id),
        Role::Customer => order.customer_id == requester.user_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus::*;
    use crate::models::{NewOrder, NewOrderItem};
    use assert_matches::assert_matches;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn order_for(customer_id: Uuid) -> Order {
        Order::place(
            customer_id,
            NewOrder {
                items: vec![NewOrderItem {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                    unit_price: dec!(10.00),
                }],
                address: "4 Lake View".into(),
                phone: "5551234567".into(),
            },
        )
    }

    fn order_in(status: OrderStatus) -> Order {
        let mut order = order_for(Uuid::new_v4());
        order.status = status;
        order
    }

    #[rstest]
    #[case(Placed, vec![Processed, Canceled])]
    #[case(Processed, vec![Shipped, Canceled])]
    #[case(Shipped, vec![ReachedHub, Canceled])]
    #[case(ReachedHub, vec![OutForDelivery, Canceled])]
    #[case(OutForDelivery, vec![Delivered, Canceled])]
    #[case(Delivered, vec![])]
    #[case(Canceled, vec![])]
    fn transition_table(#[case] from: OrderStatus, #[case] expected: Vec<OrderStatus>) {
        assert_eq!(allowed_next(from), expected);
    }

    #[test]
    fn edge_counts() {
        let edges: Vec<(OrderStatus, OrderStatus)> = OrderStatus::all()
            .into_iter()
            .flat_map(|from| allowed_next(from).into_iter().map(move |to| (from, to)))
            .collect();
        let cancels = edges.iter().filter(|(_, to)| *to == Canceled).count();
        assert_eq!(cancels, 5);
        assert_eq!(edges.len() - cancels, 5);
    }

    #[rstest]
    #[case(Placed, true)]
    #[case(Processed, true)]
    #[case(Shipped, true)]
    #[case(ReachedHub, false)]
    #[case(OutForDelivery, false)]
    #[case(Delivered, false)]
    #[case(Canceled, false)]
    fn customer_cancel_window(#[case] from: OrderStatus, #[case] allowed: bool) {
        assert_eq!(can_transition(from, Canceled, Role::Customer), allowed);
    }

    #[test]
    fn only_customers_cancel() {
        for from in [Placed, Processed, Shipped] {
            assert!(!can_transition(from, Canceled, Role::Admin));
            assert!(!can_transition(from, Canceled, Role::DeliveryAgent));
        }
    }

    #[test]
    fn no_skipping_intermediate_states() {
        assert!(!can_transition(Placed, Shipped, Role::Admin));
        assert!(!can_transition(Placed, Delivered, Role::DeliveryAgent));
        assert!(!can_transition(Shipped, Processed, Role::Admin));
        assert!(!can_transition(Placed, Placed, Role::Admin));
    }

    #[test]
    fn customers_cannot_advance() {
        assert!(!can_transition(Placed, Processed, Role::Customer));
        assert!(can_transition(Placed, Processed, Role::Admin));
        assert!(can_transition(OutForDelivery, Delivered, Role::DeliveryAgent));
    }

    #[test]
    fn terminal_states_reject_everything() {
        for from in [Delivered, Canceled] {
            for to in OrderStatus::all() {
                for role in [Role::Admin, Role::DeliveryAgent, Role::Customer] {
                    assert!(!can_transition(from, to, role));
                }
            }
        }
    }

    #[test]
    fn failed_apply_leaves_order_untouched() {
        let order = order_in(Delivered);
        let before = order.clone();

        let err = apply_transition(&order, Processed, &Requester::admin(Uuid::new_v4()))
            .unwrap_err();

        assert_matches!(
            err,
            TransitionError::InvalidTransition {
                from: Delivered,
                to: Processed
            }
        );
        assert_eq!(order, before);
    }

    #[test]
    fn unassigned_agent_is_rejected_assigned_agent_is_allowed() {
        let agent = Uuid::new_v4();
        let mut order = order_in(Placed);

        let err = apply_transition(&order, Processed, &Requester::agent(agent)).unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });

        order.assigned_agent_id = Some(Uuid::new_v4());
        let err = apply_transition(&order, Processed, &Requester::agent(agent)).unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });

        order.assigned_agent_id = Some(agent);
        let updated = apply_transition(&order, Processed, &Requester::agent(agent)).unwrap();
        assert_eq!(updated.status, Processed);
        assert_eq!(updated.version, order.version + 1);
    }

    #[test]
    fn customer_can_only_cancel_own_order() {
        let owner = Uuid::new_v4();
        let order = order_for(owner);

        let err = apply_transition(&order, Canceled, &Requester::customer(Uuid::new_v4()))
            .unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });

        let canceled = apply_transition(&order, Canceled, &Requester::customer(owner)).unwrap();
        assert_eq!(canceled.status, Canceled);
    }

    #[test]
    fn late_cancel_is_unauthorized_not_invalid() {
        let owner = Uuid::new_v4();
        let mut order = order_for(owner);
        order.status = OutForDelivery;

        let err = apply_transition(&order, Canceled, &Requester::customer(owner)).unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });
        assert_eq!(err.kind(), "unauthorized");
    }

    #[test]
    fn lifecycle_scenario() {
        let owner = Uuid::new_v4();
        let admin = Requester::admin(Uuid::new_v4());
        let order = order_for(owner);

        let err = apply_transition(&order, Processed, &Requester::agent(Uuid::new_v4()))
            .unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });

        let order = apply_transition(&order, Processed, &admin).unwrap();
        assert_eq!(order.status, Processed);

        let order = apply_transition(&order, Canceled, &Requester::customer(owner)).unwrap();
        assert_eq!(order.status, Canceled);

        let err = apply_transition(&order, Shipped, &admin).unwrap_err();
        assert_matches!(
            err,
            TransitionError::InvalidTransition {
                from: Canceled,
                to: Shipped
            }
        );
    }

    #[test]
    fn replaying_a_terminal_transition_fails() {
        let agent = Uuid::new_v4();
        let mut order = order_in(OutForDelivery);
        order.assigned_agent_id = Some(agent);

        let delivered = apply_transition(&order, Delivered, &Requester::agent(agent)).unwrap();
        let replay = apply_transition(&delivered, Delivered, &Requester::agent(agent));
        assert_matches!(replay, Err(TransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn assign_agent_is_admin_only_and_repeatable() {
        let order = order_in(Shipped);
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let err = assign_agent(&order, first, &Requester::agent(first)).unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });
        let err = assign_agent(&order, first, &Requester::customer(order.customer_id))
            .unwrap_err();
        assert_matches!(err, TransitionError::Unauthorized { .. });

        let admin = Requester::admin(Uuid::new_v4());
        let assigned = assign_agent(&order, first, &admin).unwrap();
        assert_eq!(assigned.assigned_agent_id, Some(first));

        let reassigned = assign_agent(&assigned, second, &admin).unwrap();
        assert_eq!(reassigned.assigned_agent_id, Some(second));
        assert_eq!(reassigned.status, Shipped);
    }

    #[test]
    fn assign_agent_on_terminal_order_fails_for_every_role() {
        for status in [Canceled, Delivered] {
            let order = order_in(status);
            for requester in [
                Requester::admin(Uuid::new_v4()),
                Requester::agent(Uuid::new_v4()),
                Requester::customer(order.customer_id),
            ] {
                let err = assign_agent(&order, Uuid::new_v4(), &requester).unwrap_err();
                assert_eq!(err, TransitionError::AssignmentClosed { status });
                assert_eq!(err.kind(), "invalid_transition");
                assert_eq!(
                    err.to_string(),
                    format!("Cannot assign a delivery agent to a {status} order")
                );
            }
        }
    }

    #[test]
    fn next_statuses_depend_on_requester() {
        let owner = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let mut order = order_for(owner);
        order.status = Shipped;
        order.assigned_agent_id = Some(agent);

        assert_eq!(
            next_statuses(&order, &Requester::admin(Uuid::new_v4())),
            vec![ReachedHub]
        );
        assert_eq!(next_statuses(&order, &Requester::agent(agent)), vec![ReachedHub]);
        assert!(next_statuses(&order, &Requester::agent(Uuid::new_v4())).is_empty());
        assert_eq!(next_statuses(&order, &Requester::customer(owner)), vec![Canceled]);

        order.status = ReachedHub;
        assert!(next_statuses(&order, &Requester::customer(owner)).is_empty());
    }

    #[test]
    fn visibility() {
        let owner = Uuid::new_v4();
        let agent = Uuid::new_v4();
        let mut order = order_for(owner);

        assert!(can_view(&order, &Requester::admin(Uuid::new_v4())));
        assert!(can_view(&order, &Requester::customer(owner)));
        assert!(!can_view(&order, &Requester::customer(Uuid::new_v4())));
        assert!(!can_view(&order, &Requester::agent(agent)));

        order.assigned_agent_id = Some(agent);
        assert!(can_view(&order, &Requester::agent(agent)));
    }
}

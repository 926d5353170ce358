//! Order state machine.
//!
//! Fixed transition table validated on every status change. All code that
//! mutates an order's status funnels through [`apply`]; storage backends only
//! persist statuses this module has already produced.
//!
//! The table includes BATCHED -> PREPARING (what locking a batch performs)
//! and onward edges for PREPARING; see DESIGN.md for the rationale.

use crate::types::{Order, OrderStatus, SchedulerError};
use tracing::warn;

/// Allowed target statuses for a given current status.
///
/// Terminal statuses (COMPLETED, CANCELLED) return an empty slice.
pub fn allowed_targets(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;
    match from {
        New => &[Batched, OutForDelivery, Completed, Cancelled],
        Batched => &[New, Preparing, OutForDelivery, Completed, Cancelled],
        Preparing => &[OutForDelivery, Completed, Cancelled],
        OutForDelivery => &[New, Preparing, ReadyForPickup, Completed, Cancelled],
        ReadyForPickup => &[Completed, Cancelled],
        Completed => &[],
        Cancelled => &[],
    }
}

/// Check whether `from -> to` is a legal transition.
pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_targets(from).contains(&to)
}

/// Transition an order to `to`, validating against the table.
///
/// A transition to the current status is an idempotent no-op rather than an
/// error, but is logged: callers are not expected to repeat transitions, so
/// a recurring warning here points at a caller bug.
pub fn apply(order: &mut Order, to: OrderStatus) -> Result<(), SchedulerError> {
    if order.status == to {
        warn!(
            order_id = %order.id,
            status = %to,
            "repeated identical order transition (no-op)"
        );
        return Ok(());
    }
    if !is_allowed(order.status, to) {
        return Err(SchedulerError::IllegalTransition {
            from: order.status,
            to,
        });
    }
    order.status = to;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Order, OrderStatus, SchedulerError};
    use chrono::NaiveDate;

    fn order_with_status(status: OrderStatus) -> Order {
        Order {
            id: "ord-1".to_string(),
            display_id: "A-1001".to_string(),
            shop_id: "shop-1".to_string(),
            batch_id: None,
            status,
            otp: None,
            created_at: NaiveDate::from_ymd_opt(2025, 3, 10)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_new_order_can_be_batched() {
        let mut order = order_with_status(OrderStatus::New);
        apply(&mut order, OrderStatus::Batched).unwrap();
        assert_eq!(order.status, OrderStatus::Batched);
    }

    #[test]
    fn test_batched_order_can_start_preparing() {
        let mut order = order_with_status(OrderStatus::Batched);
        apply(&mut order, OrderStatus::Preparing).unwrap();
        assert_eq!(order.status, OrderStatus::Preparing);
    }

    #[test]
    fn test_preparing_cannot_return_to_batched() {
        let mut order = order_with_status(OrderStatus::Preparing);
        let err = apply(&mut order, OrderStatus::Batched).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::IllegalTransition {
                from: OrderStatus::Preparing,
                to: OrderStatus::Batched,
            }
        ));
        assert_eq!(order.status, OrderStatus::Preparing);
    }

    #[test]
    fn test_completed_is_terminal() {
        for to in [
            OrderStatus::New,
            OrderStatus::Batched,
            OrderStatus::Preparing,
            OrderStatus::OutForDelivery,
            OrderStatus::ReadyForPickup,
            OrderStatus::Cancelled,
        ] {
            let mut order = order_with_status(OrderStatus::Completed);
            let err = apply(&mut order, to).unwrap_err();
            assert!(matches!(err, SchedulerError::IllegalTransition { .. }));
            assert_eq!(order.status, OrderStatus::Completed);
        }
    }

    #[test]
    fn test_cancelled_is_terminal() {
        let mut order = order_with_status(OrderStatus::Cancelled);
        let err = apply(&mut order, OrderStatus::New).unwrap_err();
        assert!(matches!(err, SchedulerError::IllegalTransition { .. }));
    }

    #[test]
    fn test_identical_transition_is_noop() {
        let mut order = order_with_status(OrderStatus::Batched);
        apply(&mut order, OrderStatus::Batched).unwrap();
        assert_eq!(order.status, OrderStatus::Batched);
    }

    #[test]
    fn test_out_for_delivery_can_complete() {
        let mut order = order_with_status(OrderStatus::OutForDelivery);
        apply(&mut order, OrderStatus::Completed).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
    }
}

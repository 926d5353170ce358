//! Delivery OTP Module
//!
//! Issues the one-time numeric code minted for every order when its batch is
//! locked, and verifies a presented code exactly once.
//!
//! Verification fails closed: unknown order, cross-shop order, code mismatch
//! and already-consumed code all produce the same generic rejection, never an
//! error, so a guessing attempt looks identical to a typo.

use crate::notify::Notifier;
use crate::orders::state_machine;
use crate::store::Store;
use crate::types::{BatchStatus, OrderEvent, OrderStatus, SchedulerError, VerifyOutcome};
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info};

/// Number of digits in a delivery code.
pub const CODE_LEN: usize = 4;

/// Mint a fresh 4-digit code from OS entropy.
///
/// Codes are scoped to one order within one batch's lock-to-delivery window;
/// no global uniqueness is needed. Zero-padded so "0042" survives as text.
pub fn issue_code() -> String {
    let mut rng = OsRng;
    format!("{:04}", rng.gen_range(0..10_000))
}

/// Reject anything that is not exactly four ASCII digits, before storage is
/// touched.
pub fn validate_format(code: &str) -> Result<(), SchedulerError> {
    if code.len() != CODE_LEN || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SchedulerError::Validation(format!(
            "delivery code must be exactly {CODE_LEN} digits"
        )));
    }
    Ok(())
}

/// Verifies presented delivery codes against the store.
pub struct OtpVerifier {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl OtpVerifier {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Verify `submitted` for an order on behalf of `shop_id`.
    ///
    /// On success the code is consumed and the order completed in one atomic
    /// store update; the outcome of a retried identical request is a plain
    /// rejection. Only malformed input surfaces as an error.
    pub async fn verify(
        &self,
        order_id: &str,
        submitted: &str,
        shop_id: &str,
    ) -> Result<VerifyOutcome, SchedulerError> {
        validate_format(submitted)?;

        let Some(order) = self.store.get_order(order_id).await? else {
            debug!(order_id, "otp verify for unknown order");
            return Ok(VerifyOutcome::rejected());
        };
        if order.shop_id != shop_id {
            debug!(order_id, shop_id, "otp verify across shops");
            return Ok(VerifyOutcome::rejected());
        }
        // The order's batch, if any, must belong to the presenting shop too.
        if let Some(batch_id) = &order.batch_id {
            match self.store.get_batch(batch_id).await? {
                Some(batch) if batch.shop_id == shop_id => {}
                _ => {
                    debug!(order_id, "otp verify against foreign batch");
                    return Ok(VerifyOutcome::rejected());
                }
            }
        }
        // A completion the state machine would refuse (terminal order) is a
        // rejection here, not an error.
        let mut candidate = order.clone();
        if state_machine::apply(&mut candidate, OrderStatus::Completed).is_err() {
            return Ok(VerifyOutcome::rejected());
        }

        if !self.store.complete_order_with_otp(order_id, submitted).await? {
            return Ok(VerifyOutcome::rejected());
        }

        info!(order_id, display_id = %order.display_id, "order hand-off confirmed");
        self.notifier.publish(OrderEvent {
            order_id: order.id.clone(),
            display_id: order.display_id.clone(),
            shop_id: order.shop_id.clone(),
            batch_id: order.batch_id.clone(),
            status: OrderStatus::Completed,
            at: chrono::Local::now().naive_local(),
        });

        // Once every member order is terminal the batch itself is done.
        if let Some(batch_id) = &order.batch_id {
            self.maybe_complete_batch(batch_id).await?;
        }

        Ok(VerifyOutcome::accepted())
    }

    /// Advance a batch to COMPLETED once all of its member orders are
    /// terminal. No-op when the batch is not OUT_FOR_DELIVERY.
    async fn maybe_complete_batch(&self, batch_id: &str) -> Result<(), SchedulerError> {
        let orders = self.store.batch_orders(batch_id).await?;
        if orders.iter().all(|o| o.status.is_terminal()) {
            let completed = self
                .store
                .apply_batch_transition(
                    batch_id,
                    BatchStatus::OutForDelivery,
                    BatchStatus::Completed,
                    &[],
                )
                .await?;
            if completed {
                info!(batch_id, "batch completed, all orders handed off");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_code_is_four_digits() {
        for _ in 0..100 {
            let code = issue_code();
            assert_eq!(code.len(), 4);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_validate_format_accepts_four_digits() {
        assert!(validate_format("0042").is_ok());
        assert!(validate_format("9999").is_ok());
    }

    #[test]
    fn test_validate_format_rejects_malformed() {
        for bad in ["123", "12345", "12a4", "    ", "", "١٢٣٤"] {
            assert!(validate_format(bad).is_err(), "accepted {bad:?}");
        }
    }
}

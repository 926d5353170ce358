//! Batch service.
//!
//! Implements the four batch mutations. Every multi-order operation follows
//! the same shape: load the batch and its members, validate every member
//! transition through the order state machine (pure, nothing written yet),
//! then hand the whole set to the store as one conditional update. Any
//! rejected member aborts the operation before a single row changes.

use crate::notify::Notifier;
use crate::orders::state_machine;
use crate::otp;
use crate::schedule;
use crate::store::{OrderUpdate, Store};
use crate::types::{
    Batch, BatchStatus, Order, OrderEvent, OrderStatus, SchedulerError,
};
use chrono::NaiveDateTime;
use std::sync::Arc;
use tracing::{debug, info};

pub struct BatchService {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
}

impl BatchService {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Assign a freshly placed order to the shop's upcoming batch.
    ///
    /// Returns `Ok(None)` when the order stays unbatched: batching disabled,
    /// no slots configured, the target batch already at capacity, or the
    /// upcoming cutoff's batch already locked. The caller proceeds with the
    /// individual-delivery flow in that case.
    pub async fn assign_order_to_batch(
        &self,
        shop_id: &str,
        order_id: &str,
        now: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError> {
        let Some(shop_schedule) = self.store.get_schedule(shop_id).await? else {
            return Ok(None);
        };
        if !shop_schedule.accepts_batching() {
            return Ok(None);
        }
        let Some(cutoff) = schedule::next_cutoff(&shop_schedule.slots, now) else {
            return Ok(None);
        };

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        if order.shop_id != shop_id {
            return Err(SchedulerError::Unauthorized);
        }
        // Validate NEW -> BATCHED up front; the store only persists the result.
        let mut candidate = order.clone();
        state_machine::apply(&mut candidate, OrderStatus::Batched)?;

        let attached = self
            .store
            .attach_order(
                shop_id,
                order_id,
                cutoff,
                shop_schedule.slot_capacity,
                candidate.status,
                now,
            )
            .await?;

        match attached {
            Some(batch) => {
                info!(
                    order_id,
                    batch_id = %batch.id,
                    cutoff = %batch.cutoff_time,
                    "order joined batch"
                );
                self.emit(&candidate, Some(batch.id.clone()));
                Ok(Some(batch))
            }
            None => {
                debug!(order_id, %cutoff, "slot full or closed, order stays unbatched");
                Ok(None)
            }
        }
    }

    /// Lock a batch: freeze membership, move every member into preparation
    /// and mint a delivery OTP per member. All-or-nothing.
    pub async fn lock_batch(&self, batch_id: &str, shop_id: &str) -> Result<(), SchedulerError> {
        let batch = self.owned_batch(batch_id, shop_id).await?;
        if batch.status != BatchStatus::Open {
            return Err(SchedulerError::InvalidState {
                status: batch.status,
            });
        }

        let orders = self.store.batch_orders(batch_id).await?;
        let mut updates = Vec::with_capacity(orders.len());
        let mut transitioned = Vec::with_capacity(orders.len());
        for order in &orders {
            // A single rejected member aborts the whole lock.
            let mut next = order.clone();
            state_machine::apply(&mut next, OrderStatus::Preparing)?;
            updates.push(OrderUpdate {
                order_id: next.id.clone(),
                status: next.status,
                otp: Some(otp::issue_code()),
            });
            transitioned.push(next);
        }

        self.commit(batch_id, BatchStatus::Open, BatchStatus::Locked, &updates)
            .await?;

        info!(batch_id, orders = updates.len(), "batch locked for preparation");
        for order in &transitioned {
            self.emit(order, order.batch_id.clone());
        }
        Ok(())
    }

    /// Dispatch a locked batch: batch and every member go OUT_FOR_DELIVERY.
    pub async fn start_delivery(&self, batch_id: &str) -> Result<(), SchedulerError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        if batch.status != BatchStatus::Locked {
            return Err(SchedulerError::InvalidState {
                status: batch.status,
            });
        }

        let orders = self.store.batch_orders(batch_id).await?;
        let mut updates = Vec::with_capacity(orders.len());
        let mut transitioned = Vec::with_capacity(orders.len());
        for order in &orders {
            let mut next = order.clone();
            state_machine::apply(&mut next, OrderStatus::OutForDelivery)?;
            updates.push(OrderUpdate {
                order_id: next.id.clone(),
                status: next.status,
                otp: None,
            });
            transitioned.push(next);
        }

        self.commit(
            batch_id,
            BatchStatus::Locked,
            BatchStatus::OutForDelivery,
            &updates,
        )
        .await?;

        info!(batch_id, orders = updates.len(), "batch out for delivery");
        for order in &transitioned {
            self.emit(order, order.batch_id.clone());
        }
        Ok(())
    }

    /// Cancel a batch from OPEN or LOCKED.
    ///
    /// Mid-delivery cancellation is rejected: hand-off may already be
    /// underway. Returns the exact number of member orders cancelled, which
    /// excludes members that were already COMPLETED or CANCELLED.
    pub async fn cancel_batch(
        &self,
        batch_id: &str,
        reason: &str,
    ) -> Result<u64, SchedulerError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        if !matches!(batch.status, BatchStatus::Open | BatchStatus::Locked) {
            return Err(SchedulerError::InvalidState {
                status: batch.status,
            });
        }

        let orders = self.store.batch_orders(batch_id).await?;
        let mut updates = Vec::new();
        let mut transitioned = Vec::new();
        for order in &orders {
            if order.status.is_terminal() {
                continue;
            }
            let mut next = order.clone();
            state_machine::apply(&mut next, OrderStatus::Cancelled)?;
            updates.push(OrderUpdate {
                order_id: next.id.clone(),
                status: next.status,
                otp: None,
            });
            transitioned.push(next);
        }
        let affected = updates.len() as u64;

        self.commit(batch_id, batch.status, BatchStatus::Cancelled, &updates)
            .await?;

        info!(batch_id, affected, reason, "batch cancelled");
        for order in &transitioned {
            self.emit(order, order.batch_id.clone());
        }
        Ok(affected)
    }

    /// Batch lookup that treats another shop's batch as absent.
    async fn owned_batch(&self, batch_id: &str, shop_id: &str) -> Result<Batch, SchedulerError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        if batch.shop_id != shop_id {
            return Err(SchedulerError::NotFound);
        }
        Ok(batch)
    }

    /// Run the conditional store update; a lost status race surfaces as
    /// InvalidState carrying the status the winner left behind.
    async fn commit(
        &self,
        batch_id: &str,
        expected: BatchStatus,
        next: BatchStatus,
        updates: &[OrderUpdate],
    ) -> Result<(), SchedulerError> {
        let won = self
            .store
            .apply_batch_transition(batch_id, expected, next, updates)
            .await?;
        if !won {
            let status = self
                .store
                .get_batch(batch_id)
                .await?
                .ok_or(SchedulerError::NotFound)?
                .status;
            return Err(SchedulerError::InvalidState { status });
        }
        Ok(())
    }

    fn emit(&self, order: &Order, batch_id: Option<String>) {
        self.notifier.publish(OrderEvent {
            order_id: order.id.clone(),
            display_id: order.display_id.clone(),
            shop_id: order.shop_id.clone(),
            batch_id,
            status: order.status,
            at: chrono::Local::now().naive_local(),
        });
    }
}

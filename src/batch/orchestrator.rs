//! Batch Orchestrator Module
//!
//! Thin composition layer translating vendor intents into the underlying
//! primitives. Holds no state of its own; every mutating call re-validates
//! shop ownership of the target before delegating, so a cross-tenant call
//! dies here even if a future caller forgets a check.
//!
//! # Flow
//! new order -> `place_order` resolves/joins a batch -> vendor `lock` ->
//! members move to PREPARING with OTPs minted -> `start_delivery` -> members
//! OUT_FOR_DELIVERY -> customer presents the code -> `verify_otp` completes
//! the order.

use crate::batch::BatchService;
use crate::notify::Notifier;
use crate::otp::OtpVerifier;
use crate::schedule;
use crate::store::Store;
use crate::types::{
    Batch, BatchSummary, DashboardView, NextSlot, Order, OrderStatus, SchedulerError,
    ShopSchedule, SlotAvailability, VerifyOutcome,
};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

pub struct BatchOrchestrator {
    store: Arc<dyn Store>,
    service: BatchService,
    verifier: OtpVerifier,
}

impl BatchOrchestrator {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            service: BatchService::new(store.clone(), notifier.clone()),
            verifier: OtpVerifier::new(store.clone(), notifier),
            store,
        }
    }

    // --- shop settings ---

    /// Replace a shop's batching schedule. Slots must be strictly increasing.
    pub async fn update_schedule(&self, schedule: ShopSchedule) -> Result<(), SchedulerError> {
        schedule::validate_slots(&schedule.slots)?;
        info!(
            shop_id = %schedule.shop_id,
            slots = schedule.slots.len(),
            enabled = schedule.enabled,
            "shop schedule updated"
        );
        self.store.upsert_schedule(schedule).await
    }

    // --- order intake ---

    /// Record a freshly checked-out order and try to batch it.
    ///
    /// Returns the stored order and the batch it joined, if any; `None` means
    /// the order proceeds through the individual-delivery flow.
    pub async fn place_order(
        &self,
        shop_id: &str,
        order_id: &str,
        display_id: &str,
        now: NaiveDateTime,
    ) -> Result<(Order, Option<Batch>), SchedulerError> {
        let order = Order {
            id: order_id.to_string(),
            display_id: display_id.to_string(),
            shop_id: shop_id.to_string(),
            batch_id: None,
            status: OrderStatus::New,
            otp: None,
            created_at: now,
        };
        self.store.insert_order(order.clone()).await?;

        let batch = self
            .service
            .assign_order_to_batch(shop_id, order_id, now)
            .await?;
        // Reload: assignment may have changed status and batch reference.
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        Ok((order, batch))
    }

    // --- vendor mutations ---

    pub async fn lock(&self, batch_id: &str, shop_id: &str) -> Result<(), SchedulerError> {
        self.ensure_owner(batch_id, shop_id).await?;
        self.service.lock_batch(batch_id, shop_id).await
    }

    pub async fn start_delivery(
        &self,
        batch_id: &str,
        shop_id: &str,
    ) -> Result<(), SchedulerError> {
        self.ensure_owner(batch_id, shop_id).await?;
        self.service.start_delivery(batch_id).await
    }

    pub async fn cancel(
        &self,
        batch_id: &str,
        shop_id: &str,
        reason: &str,
    ) -> Result<u64, SchedulerError> {
        self.ensure_owner(batch_id, shop_id).await?;
        self.service.cancel_batch(batch_id, reason).await
    }

    pub async fn verify_otp(
        &self,
        order_id: &str,
        code: &str,
        shop_id: &str,
    ) -> Result<VerifyOutcome, SchedulerError> {
        self.verifier.verify(order_id, code, shop_id).await
    }

    // --- reads ---

    /// Resolve the shop's next batching slot.
    pub async fn next_slot(
        &self,
        shop_id: &str,
        now: NaiveDateTime,
    ) -> Result<NextSlot, SchedulerError> {
        let Some(shop_schedule) = self.store.get_schedule(shop_id).await? else {
            return Ok(NextSlot::disabled());
        };
        if !shop_schedule.accepts_batching() {
            return Ok(NextSlot::disabled());
        }
        let Some(cutoff) = schedule::next_cutoff(&shop_schedule.slots, now) else {
            return Ok(NextSlot::disabled());
        };
        // A batch with zero members has not materialized; the slot still
        // exists, it just is not "open" for display purposes.
        let open = self.store.find_open_batch(shop_id, cutoff).await?;
        Ok(NextSlot {
            enabled: true,
            cutoff_time: Some(cutoff),
            is_open: open.is_some(),
            batch_id: open.map(|b| b.id),
        })
    }

    /// Every configured cutoff for the current horizon with its fill level.
    pub async fn slots_with_availability(
        &self,
        shop_id: &str,
        now: NaiveDateTime,
    ) -> Result<Vec<SlotAvailability>, SchedulerError> {
        let Some(shop_schedule) = self.store.get_schedule(shop_id).await? else {
            return Ok(Vec::new());
        };
        if !shop_schedule.accepts_batching() {
            return Ok(Vec::new());
        }
        let capacity = shop_schedule.slot_capacity;
        let mut slots = Vec::with_capacity(shop_schedule.slots.len());
        for cutoff in schedule::slot_occurrences(&shop_schedule.slots, now) {
            let order_count = match self.store.find_open_batch(shop_id, cutoff).await? {
                Some(batch) => self.store.count_batch_orders(&batch.id).await?,
                None => 0,
            };
            slots.push(SlotAvailability {
                cutoff_time: cutoff,
                order_count,
                capacity,
                remaining: capacity.map(|cap| cap.saturating_sub(order_count as u32)),
            });
        }
        Ok(slots)
    }

    /// Vendor dashboard: next-cutoff summary plus the shop's non-terminal
    /// batches with member counts grouped by order status.
    pub async fn vendor_dashboard(
        &self,
        shop_id: &str,
        now: NaiveDateTime,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<DashboardView, SchedulerError> {
        let next_slot = self.next_slot(shop_id, now).await?;
        let page = self.store.list_active_batches(shop_id, limit, cursor).await?;

        let mut batches = Vec::with_capacity(page.items.len());
        for batch in page.items {
            let orders = self.store.batch_orders(&batch.id).await?;
            let mut status_counts: BTreeMap<OrderStatus, u64> = BTreeMap::new();
            for order in &orders {
                *status_counts.entry(order.status).or_insert(0) += 1;
            }
            batches.push(BatchSummary {
                batch_id: batch.id,
                cutoff_time: batch.cutoff_time,
                status: batch.status,
                order_count: orders.len() as u64,
                status_counts,
            });
        }

        Ok(DashboardView {
            next_slot,
            batches,
            next_cursor: page.next_cursor,
        })
    }

    /// Cross-tenant defense shared by every mutating vendor call. A foreign
    /// batch is indistinguishable from a missing one to the caller.
    async fn ensure_owner(&self, batch_id: &str, shop_id: &str) -> Result<(), SchedulerError> {
        let batch = self
            .store
            .get_batch(batch_id)
            .await?
            .ok_or(SchedulerError::NotFound)?;
        if batch.shop_id != shop_id {
            return Err(SchedulerError::Unauthorized);
        }
        Ok(())
    }
}

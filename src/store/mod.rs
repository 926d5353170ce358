//! Persistence Module
//!
//! Abstract contract over the batch/order store plus two backends:
//! - `MemoryStore`: lock-protected maps, used by unit tests
//! - `SqliteStore`: sqlx-backed persistent store used by the binary
//!
//! The trait exposes plain CRUD plus three compound operations that mirror the
//! scheduler's consistency boundaries. Each compound operation commits as one
//! unit; a batch and its member orders are never observable half-updated.

mod memory;
mod sqlite;

use crate::types::{Batch, BatchStatus, Order, OrderStatus, Page, SchedulerError, ShopSchedule};
use async_trait::async_trait;
use chrono::NaiveDateTime;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// One order's share of an atomic batch update.
///
/// The status has already been validated by the order state machine; the
/// store only persists it.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    /// `Some(code)` installs a fresh delivery OTP alongside the status.
    pub otp: Option<String>,
}

/// Persistence contract consumed by the scheduler.
///
/// Identifiers are opaque strings. Listing uses `limit` plus an opaque
/// cursor; callers treat the cursor as a token and feed it back unchanged.
#[async_trait]
pub trait Store: Send + Sync {
    // --- shop schedule ---
    async fn upsert_schedule(&self, schedule: ShopSchedule) -> Result<(), SchedulerError>;
    async fn get_schedule(&self, shop_id: &str) -> Result<Option<ShopSchedule>, SchedulerError>;

    // --- orders ---
    async fn insert_order(&self, order: Order) -> Result<(), SchedulerError>;
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, SchedulerError>;

    // --- batches ---
    async fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, SchedulerError>;
    /// The OPEN batch at (shop, cutoff), if one has materialized.
    async fn find_open_batch(
        &self,
        shop_id: &str,
        cutoff: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError>;
    /// Member orders of a batch (membership is a back-reference on the order).
    async fn batch_orders(&self, batch_id: &str) -> Result<Vec<Order>, SchedulerError>;
    async fn count_batch_orders(&self, batch_id: &str) -> Result<u64, SchedulerError>;
    /// Non-terminal batches of a shop, ordered by cutoff then id.
    async fn list_active_batches(
        &self,
        shop_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Batch>, SchedulerError>;

    // --- compound operations (each commits as one unit) ---

    /// Find-or-create the OPEN batch at (shop, cutoff) and attach the order,
    /// persisting the already-validated `new_status`.
    ///
    /// At most one non-terminal batch can exist per (shop, cutoff) pair, even
    /// under concurrent calls. Returns `None` without changing anything when
    /// the order cannot join: the batch is full (`capacity` members), or the
    /// slot is held by a non-terminal batch that is no longer OPEN (already
    /// locked or dispatched). The caller falls back to direct delivery.
    async fn attach_order(
        &self,
        shop_id: &str,
        order_id: &str,
        cutoff: NaiveDateTime,
        capacity: Option<u32>,
        new_status: OrderStatus,
        now: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError>;

    /// Conditionally move a batch from `expected` to `next` and apply all
    /// member order updates in the same unit.
    ///
    /// Returns `Ok(false)` without changing anything when the batch's current
    /// status is not `expected` (a concurrent operation won the race).
    async fn apply_batch_transition(
        &self,
        batch_id: &str,
        expected: BatchStatus,
        next: BatchStatus,
        order_updates: &[OrderUpdate],
    ) -> Result<bool, SchedulerError>;

    /// Exactly-once OTP redemption: atomically clear the order's code and
    /// mark it COMPLETED, conditional on the code matching and the order not
    /// being terminal. Returns whether the update applied.
    async fn complete_order_with_otp(
        &self,
        order_id: &str,
        code: &str,
    ) -> Result<bool, SchedulerError>;
}

/// Encode a pagination cursor for a batch listing position.
pub(crate) fn encode_cursor(cutoff: NaiveDateTime, id: &str) -> String {
    format!("{}:{}", cutoff.and_utc().timestamp(), id)
}

/// Decode a cursor produced by [`encode_cursor`].
pub(crate) fn decode_cursor(cursor: &str) -> Result<(i64, String), SchedulerError> {
    let (ts, id) = cursor
        .split_once(':')
        .ok_or_else(|| SchedulerError::Validation("malformed pagination cursor".to_string()))?;
    let ts = ts
        .parse::<i64>()
        .map_err(|_| SchedulerError::Validation("malformed pagination cursor".to_string()))?;
    Ok((ts, id.to_string()))
}

//! In-memory store.
//!
//! HashMaps behind a single `tokio::sync::RwLock`; the write lock is the
//! atomicity boundary, so every compound operation is trivially all-or-nothing.
//! Used by unit tests and available for embedding without a database.

use super::{decode_cursor, encode_cursor, OrderUpdate, Store};
use crate::types::{Batch, BatchStatus, Order, OrderStatus, Page, SchedulerError, ShopSchedule};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    schedules: HashMap<String, ShopSchedule>,
    orders: HashMap<String, Order>,
    batches: HashMap<String, Batch>,
    next_batch_seq: u64,
}

impl Inner {
    fn member_count(&self, batch_id: &str) -> u64 {
        self.orders
            .values()
            .filter(|o| o.batch_id.as_deref() == Some(batch_id))
            .count() as u64
    }

    fn open_batch(&self, shop_id: &str, cutoff: NaiveDateTime) -> Option<&Batch> {
        self.batches.values().find(|b| {
            b.shop_id == shop_id && b.cutoff_time == cutoff && b.status == BatchStatus::Open
        })
    }

    /// Any non-terminal batch at (shop, cutoff). Such a batch occupies the
    /// uniqueness slot even after it stops being OPEN.
    fn live_batch(&self, shop_id: &str, cutoff: NaiveDateTime) -> Option<&Batch> {
        self.batches.values().find(|b| {
            b.shop_id == shop_id && b.cutoff_time == cutoff && !b.status.is_terminal()
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_schedule(&self, schedule: ShopSchedule) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        inner.schedules.insert(schedule.shop_id.clone(), schedule);
        Ok(())
    }

    async fn get_schedule(&self, shop_id: &str) -> Result<Option<ShopSchedule>, SchedulerError> {
        let inner = self.inner.read().await;
        Ok(inner.schedules.get(shop_id).cloned())
    }

    async fn insert_order(&self, order: Order) -> Result<(), SchedulerError> {
        let mut inner = self.inner.write().await;
        if inner.orders.contains_key(&order.id) {
            return Err(SchedulerError::Validation(format!(
                "order {} already exists",
                order.id
            )));
        }
        inner.orders.insert(order.id.clone(), order);
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, SchedulerError> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(order_id).cloned())
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, SchedulerError> {
        let inner = self.inner.read().await;
        Ok(inner.batches.get(batch_id).cloned())
    }

    async fn find_open_batch(
        &self,
        shop_id: &str,
        cutoff: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError> {
        let inner = self.inner.read().await;
        Ok(inner.open_batch(shop_id, cutoff).cloned())
    }

    async fn batch_orders(&self, batch_id: &str) -> Result<Vec<Order>, SchedulerError> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }

    async fn count_batch_orders(&self, batch_id: &str) -> Result<u64, SchedulerError> {
        let inner = self.inner.read().await;
        Ok(inner.member_count(batch_id))
    }

    async fn list_active_batches(
        &self,
        shop_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Batch>, SchedulerError> {
        let after = cursor.map(decode_cursor).transpose()?;
        let inner = self.inner.read().await;

        let mut batches: Vec<Batch> = inner
            .batches
            .values()
            .filter(|b| b.shop_id == shop_id && !b.status.is_terminal())
            .cloned()
            .collect();
        batches.sort_by(|a, b| a.cutoff_time.cmp(&b.cutoff_time).then(a.id.cmp(&b.id)));

        if let Some((ts, id)) = after {
            batches.retain(|b| (b.cutoff_time.and_utc().timestamp(), b.id.as_str()) > (ts, id.as_str()));
        }

        let next_cursor = if batches.len() > limit {
            batches.truncate(limit);
            batches.last().map(|b| encode_cursor(b.cutoff_time, &b.id))
        } else {
            None
        };
        Ok(Page {
            items: batches,
            next_cursor,
        })
    }

    async fn attach_order(
        &self,
        shop_id: &str,
        order_id: &str,
        cutoff: NaiveDateTime,
        capacity: Option<u32>,
        new_status: OrderStatus,
        now: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError> {
        let mut inner = self.inner.write().await;

        if !inner.orders.contains_key(order_id) {
            return Err(SchedulerError::NotFound);
        }

        // Find-or-create under the write lock; concurrent callers serialize
        // here, so only one batch can materialize per (shop, cutoff).
        let batch = match inner.live_batch(shop_id, cutoff).cloned() {
            // A locked or dispatched batch still holds the slot but accepts
            // no new members; the order stays unbatched.
            Some(batch) if batch.status != BatchStatus::Open => return Ok(None),
            Some(batch) => {
                if let Some(cap) = capacity {
                    if inner.member_count(&batch.id) >= cap as u64 {
                        return Ok(None);
                    }
                }
                batch
            }
            None => {
                inner.next_batch_seq += 1;
                let batch = Batch {
                    id: inner.next_batch_seq.to_string(),
                    shop_id: shop_id.to_string(),
                    cutoff_time: cutoff,
                    status: BatchStatus::Open,
                    created_at: now,
                };
                inner.batches.insert(batch.id.clone(), batch.clone());
                batch
            }
        };

        let order = inner
            .orders
            .get_mut(order_id)
            .ok_or(SchedulerError::NotFound)?;
        order.batch_id = Some(batch.id.clone());
        order.status = new_status;
        Ok(Some(batch))
    }

    async fn apply_batch_transition(
        &self,
        batch_id: &str,
        expected: BatchStatus,
        next: BatchStatus,
        order_updates: &[OrderUpdate],
    ) -> Result<bool, SchedulerError> {
        let mut inner = self.inner.write().await;

        match inner.batches.get(batch_id) {
            None => return Err(SchedulerError::NotFound),
            Some(batch) if batch.status != expected => return Ok(false),
            Some(_) => {}
        }
        // Verify every order exists before mutating anything, so a missing
        // row cannot leave a half-applied update behind.
        for update in order_updates {
            if !inner.orders.contains_key(&update.order_id) {
                return Err(SchedulerError::NotFound);
            }
        }

        if let Some(batch) = inner.batches.get_mut(batch_id) {
            batch.status = next;
        }
        for update in order_updates {
            if let Some(order) = inner.orders.get_mut(&update.order_id) {
                order.status = update.status;
                if let Some(code) = &update.otp {
                    order.otp = Some(code.clone());
                }
            }
        }
        Ok(true)
    }

    async fn complete_order_with_otp(
        &self,
        order_id: &str,
        code: &str,
    ) -> Result<bool, SchedulerError> {
        let mut inner = self.inner.write().await;
        let Some(order) = inner.orders.get_mut(order_id) else {
            return Ok(false);
        };
        // Conditional update: code must match and the order must still be
        // live. Clearing the code and completing commit together.
        if order.status.is_terminal() || order.otp.as_deref() != Some(code) {
            return Ok(false);
        }
        order.status = OrderStatus::Completed;
        order.otp = None;
        Ok(true)
    }
}

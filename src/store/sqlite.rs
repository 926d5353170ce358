//! Sqlite store.
//!
//! sqlx-backed persistent store. Compound operations run inside a single
//! transaction; the one-open-batch-per-(shop, cutoff) invariant is enforced
//! with a partial unique index over non-terminal batches, so concurrent
//! attach calls cannot materialize duplicates.

use super::{decode_cursor, encode_cursor, OrderUpdate, Store};
use crate::types::{Batch, BatchStatus, Order, OrderStatus, Page, SchedulerError, ShopSchedule};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schedules (
        shop_id TEXT PRIMARY KEY,
        slots TEXT NOT NULL,
        enabled INTEGER NOT NULL,
        slot_capacity INTEGER
    )",
    "CREATE TABLE IF NOT EXISTS batches (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        shop_id TEXT NOT NULL,
        cutoff_ts INTEGER NOT NULL,
        status TEXT NOT NULL,
        created_ts INTEGER NOT NULL
    )",
    // At most one non-terminal batch per (shop, cutoff).
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_live_batch
        ON batches (shop_id, cutoff_ts)
        WHERE status NOT IN ('COMPLETED', 'CANCELLED')",
    "CREATE TABLE IF NOT EXISTS orders (
        id TEXT PRIMARY KEY,
        display_id TEXT NOT NULL,
        shop_id TEXT NOT NULL,
        batch_id TEXT,
        status TEXT NOT NULL,
        otp TEXT,
        created_ts INTEGER NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_orders_batch ON orders (batch_id)",
];

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to the database and apply the schema.
    ///
    /// The URL follows sqlx conventions, e.g.
    /// `sqlite://fulfillment.db?mode=rwc` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self, SchedulerError> {
        // An in-memory sqlite database exists per connection; cap the pool
        // at one so every caller sees the same database.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn decode_err(message: String) -> SchedulerError {
    SchedulerError::Storage(sqlx::Error::Decode(message.into()))
}

fn to_ts(dt: NaiveDateTime) -> i64 {
    dt.and_utc().timestamp()
}

fn from_ts(ts: i64) -> Result<NaiveDateTime, SchedulerError> {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| decode_err(format!("timestamp out of range: {ts}")))
}

/// Batch ids are sqlite rowids exposed as opaque strings; a non-numeric id
/// can therefore never exist.
fn parse_batch_id(batch_id: &str) -> Result<i64, SchedulerError> {
    batch_id.parse::<i64>().map_err(|_| SchedulerError::NotFound)
}

fn order_from_row(row: &SqliteRow) -> Result<Order, SchedulerError> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: row.try_get("id")?,
        display_id: row.try_get("display_id")?,
        shop_id: row.try_get("shop_id")?,
        batch_id: row.try_get("batch_id")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| decode_err(format!("unknown order status: {status}")))?,
        otp: row.try_get("otp")?,
        created_at: from_ts(row.try_get("created_ts")?)?,
    })
}

fn batch_from_row(row: &SqliteRow) -> Result<Batch, SchedulerError> {
    let status: String = row.try_get("status")?;
    let id: i64 = row.try_get("id")?;
    Ok(Batch {
        id: id.to_string(),
        shop_id: row.try_get("shop_id")?,
        cutoff_time: from_ts(row.try_get("cutoff_ts")?)?,
        status: BatchStatus::parse(&status)
            .ok_or_else(|| decode_err(format!("unknown batch status: {status}")))?,
        created_at: from_ts(row.try_get("created_ts")?)?,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_schedule(&self, schedule: ShopSchedule) -> Result<(), SchedulerError> {
        let slots = serde_json::to_string(&schedule.slots)
            .map_err(|e| decode_err(format!("slot encoding failed: {e}")))?;
        sqlx::query(
            "INSERT INTO schedules (shop_id, slots, enabled, slot_capacity)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (shop_id) DO UPDATE
             SET slots = excluded.slots,
                 enabled = excluded.enabled,
                 slot_capacity = excluded.slot_capacity",
        )
        .bind(&schedule.shop_id)
        .bind(&slots)
        .bind(schedule.enabled)
        .bind(schedule.slot_capacity)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_schedule(&self, shop_id: &str) -> Result<Option<ShopSchedule>, SchedulerError> {
        let Some(row) = sqlx::query("SELECT * FROM schedules WHERE shop_id = ?")
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };
        let slots_raw: String = row.try_get("slots")?;
        Ok(Some(ShopSchedule {
            shop_id: row.try_get("shop_id")?,
            slots: serde_json::from_str(&slots_raw)
                .map_err(|e| decode_err(format!("slot decoding failed: {e}")))?,
            enabled: row.try_get("enabled")?,
            slot_capacity: row.try_get("slot_capacity")?,
        }))
    }

    async fn insert_order(&self, order: Order) -> Result<(), SchedulerError> {
        let result = sqlx::query(
            "INSERT INTO orders (id, display_id, shop_id, batch_id, status, otp, created_ts)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&order.id)
        .bind(&order.display_id)
        .bind(&order.shop_id)
        .bind(&order.batch_id)
        .bind(order.status.as_str())
        .bind(&order.otp)
        .bind(to_ts(order.created_at))
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                SchedulerError::Validation(format!("order {} already exists", order.id)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, SchedulerError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(order_from_row).transpose()
    }

    async fn get_batch(&self, batch_id: &str) -> Result<Option<Batch>, SchedulerError> {
        let Ok(id) = batch_id.parse::<i64>() else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT * FROM batches WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn find_open_batch(
        &self,
        shop_id: &str,
        cutoff: NaiveDateTime,
    ) -> Result<Option<Batch>, SchedulerError> {
        let row = sqlx::query(
            "SELECT * FROM batches WHERE shop_id = ? AND cutoff_ts = ? AND status = 'OPEN'",
        )
        .bind(shop_id)
        .bind(to_ts(cutoff))
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn batch_orders(&self, batch_id: &str) -> Result<Vec<Order>, SchedulerError> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE batch_id = ? ORDER BY created_ts, id",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn count_batch_orders(&self, batch_id: &str) -> Result<u64, SchedulerError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE batch_id = ?")
            .bind(batch_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn list_active_batches(
        &self,
        shop_id: &str,
        limit: usize,
        cursor: Option<&str>,
    ) -> Result<Page<Batch>, SchedulerError> {
        let after = cursor.map(decode_cursor).transpose()?;
        // Fetch one extra row to detect whether another page exists.
        let fetch = (limit + 1) as i64;
        let rows = match after {
            Some((ts, id)) => {
                let id = parse_batch_id(&id)?;
                sqlx::query(
                    "SELECT * FROM batches
                     WHERE shop_id = ? AND status NOT IN ('COMPLETED', 'CANCELLED')
                       AND (cutoff_ts > ? OR (cutoff_ts = ? AND id > ?))
                     ORDER BY cutoff_ts, id LIMIT ?",
                )
                .bind(shop_id)
                .bind(ts)
                .bind(ts)
                .bind(id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM batches
                     WHERE shop_id = ? AND status NOT IN ('COMPLETED', 'CANCELLED')
                     ORDER BY cutoff_ts, id LIMIT ?",
                )
                .bind(shop_id)
                .bind(fetch)
                .fetch_all(&self.pool)
                .await?
            }
        };
        let mut items: Vec<Batch> = rows
            .iter()
            .map(batch_from_row)
            .collect::<Result<_, _>>()?;
        let next_cursor = if items.len() > limit {
            items.truncate(limit);
            items.last().map(|b| encode_cursor(b.cutoff_time, &b.id))
        } else {
            None
        };
        Ok(Page { items, next_cursor })
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
        let cutoff_ts = to_ts(cutoff);
        let mut tx = self.pool.begin().await?;

        // Find-or-create: the insert is a no-op when a live batch already
        // occupies (shop, cutoff), thanks to the partial unique index.
        sqlx::query(
            "INSERT INTO batches (shop_id, cutoff_ts, status, created_ts)
             VALUES (?, ?, 'OPEN', ?)
             ON CONFLICT DO NOTHING",
        )
        .bind(shop_id)
        .bind(cutoff_ts)
        .bind(to_ts(now))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT * FROM batches
             WHERE shop_id = ? AND cutoff_ts = ? AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(shop_id)
        .bind(cutoff_ts)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(SchedulerError::NotFound)?;
        let batch = batch_from_row(&row)?;

        // A locked or dispatched batch still holds the slot but accepts no
        // new members; roll back and leave the order unbatched.
        if batch.status != BatchStatus::Open {
            return Ok(None);
        }

        if let Some(cap) = capacity {
            let members: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE batch_id = ?")
                    .bind(&batch.id)
                    .fetch_one(&mut *tx)
                    .await?;
            if members as u64 >= cap as u64 {
                // Full slot: roll back (drops any just-created empty batch).
                return Ok(None);
            }
        }

        let updated = sqlx::query(
            "UPDATE orders SET batch_id = ?, status = ? WHERE id = ? AND shop_id = ?",
        )
        .bind(&batch.id)
        .bind(new_status.as_str())
        .bind(order_id)
        .bind(shop_id)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(SchedulerError::NotFound);
        }

        tx.commit().await?;
        Ok(Some(batch))
    }

    async fn apply_batch_transition(
        &self,
        batch_id: &str,
        expected: BatchStatus,
        next: BatchStatus,
        order_updates: &[OrderUpdate],
    ) -> Result<bool, SchedulerError> {
        let id = parse_batch_id(batch_id)?;
        let mut tx = self.pool.begin().await?;

        // Status-guarded conditional update: exactly one of two concurrent
        // attempts flips the row, the other observes zero rows affected.
        let flipped = sqlx::query("UPDATE batches SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(id)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?;
        if flipped.rows_affected() == 0 {
            let exists: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batches WHERE id = ?")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
            if exists == 0 {
                return Err(SchedulerError::NotFound);
            }
            return Ok(false);
        }

        for update in order_updates {
            let applied = sqlx::query(
                "UPDATE orders SET status = ?, otp = COALESCE(?, otp) WHERE id = ?",
            )
            .bind(update.status.as_str())
            .bind(&update.otp)
            .bind(&update.order_id)
            .execute(&mut *tx)
            .await?;
            if applied.rows_affected() == 0 {
                // Missing member order: drop the transaction, nothing sticks.
                return Err(SchedulerError::NotFound);
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn complete_order_with_otp(
        &self,
        order_id: &str,
        code: &str,
    ) -> Result<bool, SchedulerError> {
        // Consumption and completion in one conditional update, so a retry
        // after a crash can neither re-complete nor re-consume.
        let result = sqlx::query(
            "UPDATE orders SET status = 'COMPLETED', otp = NULL
             WHERE id = ? AND otp = ? AND status NOT IN ('COMPLETED', 'CANCELLED')",
        )
        .bind(order_id)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

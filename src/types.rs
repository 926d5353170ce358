use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle status of a customer order.
///
/// Orders move through these statuses exclusively via the order state machine
/// (`orders::state_machine`); no other code path mutates order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Batched,
    Preparing,
    OutForDelivery,
    ReadyForPickup,
    Completed,
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses are retained for history and never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Batched => "BATCHED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            OrderStatus::ReadyForPickup => "READY_FOR_PICKUP",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderStatus::New),
            "BATCHED" => Some(OrderStatus::Batched),
            "PREPARING" => Some(OrderStatus::Preparing),
            "OUT_FOR_DELIVERY" => Some(OrderStatus::OutForDelivery),
            "READY_FOR_PICKUP" => Some(OrderStatus::ReadyForPickup),
            "COMPLETED" => Some(OrderStatus::Completed),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a delivery batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Open,
    Locked,
    OutForDelivery,
    Completed,
    Cancelled,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Completed | BatchStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Open => "OPEN",
            BatchStatus::Locked => "LOCKED",
            BatchStatus::OutForDelivery => "OUT_FOR_DELIVERY",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(BatchStatus::Open),
            "LOCKED" => Some(BatchStatus::Locked),
            "OUT_FOR_DELIVERY" => Some(BatchStatus::OutForDelivery),
            "COMPLETED" => Some(BatchStatus::Completed),
            "CANCELLED" => Some(BatchStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Customer order, reduced to the fields the scheduler owns.
///
/// Created NEW by the checkout flow (external); `batch_id` is a weak back
/// reference to the batch the order joined, if any. The delivery OTP is set
/// when the owning batch is locked and cleared on redemption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Human-readable identifier shown to customers and vendors.
    pub display_id: String,
    pub shop_id: String,
    pub batch_id: Option<String>,
    pub status: OrderStatus,
    /// Single-use delivery code. `None` until lock, and again after redemption.
    pub otp: Option<String>,
    pub created_at: NaiveDateTime,
}

/// A time-boxed delivery batch owned by one shop.
///
/// Materialized implicitly when the first order joins a future cutoff. At most
/// one non-terminal batch exists per (shop, cutoff) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: String,
    pub shop_id: String,
    pub cutoff_time: NaiveDateTime,
    pub status: BatchStatus,
    pub created_at: NaiveDateTime,
}

/// Per-shop batching schedule (slot configuration).
///
/// `slots` are daily cutoff times and must be strictly increasing. An empty
/// slot list or `enabled = false` means the shop only supports direct
/// (non-batched) delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopSchedule {
    pub shop_id: String,
    pub slots: Vec<NaiveTime>,
    pub enabled: bool,
    /// Max orders per batch; `None` means unlimited.
    pub slot_capacity: Option<u32>,
}

impl ShopSchedule {
    pub fn accepts_batching(&self) -> bool {
        self.enabled && !self.slots.is_empty()
    }
}

/// Result of resolving a shop's next batching slot.
#[derive(Debug, Clone, Serialize)]
pub struct NextSlot {
    pub enabled: bool,
    pub cutoff_time: Option<NaiveDateTime>,
    /// Id of the OPEN batch at that cutoff, if one has materialized.
    pub batch_id: Option<String>,
    /// True iff at least one order has already joined the upcoming cutoff.
    pub is_open: bool,
}

impl NextSlot {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            cutoff_time: None,
            batch_id: None,
            is_open: false,
        }
    }
}

/// One configured cutoff with its current fill level.
#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub cutoff_time: NaiveDateTime,
    pub order_count: u64,
    pub capacity: Option<u32>,
    /// Remaining capacity; `None` when the slot is unlimited.
    pub remaining: Option<u32>,
}

/// Read-only summary of one batch for the vendor dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub cutoff_time: NaiveDateTime,
    pub status: BatchStatus,
    pub order_count: u64,
    /// Member order counts grouped by order status.
    pub status_counts: BTreeMap<OrderStatus, u64>,
}

/// Vendor dashboard view: next-cutoff summary plus active batches.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub next_slot: NextSlot,
    pub batches: Vec<BatchSummary>,
    pub next_cursor: Option<String>,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Opaque cursor for the next page; `None` when exhausted.
    pub next_cursor: Option<String>,
}

/// Outcome of an OTP verification attempt.
///
/// Business-rule failures (wrong code, consumed code, unknown order) are
/// reported through `success = false`, never as an error, so the boundary
/// layer does not log or alert on customer typos.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyOutcome {
    pub success: bool,
    pub message: String,
}

impl VerifyOutcome {
    /// Generic rejection. Deliberately does not say which check failed.
    pub fn rejected() -> Self {
        Self {
            success: false,
            message: "invalid or expired delivery code".to_string(),
        }
    }

    pub fn accepted() -> Self {
        Self {
            success: true,
            message: "order completed".to_string(),
        }
    }
}

/// Fire-and-forget event emitted whenever a batch operation changes an
/// order's status. Consumed by the notification collaborator.
#[derive(Debug, Clone, Serialize)]
pub struct OrderEvent {
    pub order_id: String,
    pub display_id: String,
    pub shop_id: String,
    pub batch_id: Option<String>,
    pub status: OrderStatus,
    pub at: NaiveDateTime,
}

/// Scheduler error taxonomy.
///
/// `NotFound` and `Unauthorized` are collapsed to the same HTTP status at the
/// boundary so cross-tenant probing cannot distinguish "absent" from "not
/// yours".
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("resource not found")]
    NotFound,
    #[error("operation not allowed while batch is {status}")]
    InvalidState { status: BatchStatus },
    #[error("illegal order transition {from} -> {to}")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    #[error("{0}")]
    Validation(String),
    #[error("shop does not own this resource")]
    Unauthorized,
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

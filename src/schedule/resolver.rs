//! Cutoff resolver.
//!
//! A shop's schedule is an ordered list of daily cutoff times. The resolver
//! maps (slots, now) to concrete instants on the shop-local clock. Recurrence
//! wraps at midnight: once today's last cutoff has passed, the next cutoff is
//! tomorrow's first slot.

use crate::types::SchedulerError;
use chrono::{NaiveDateTime, NaiveTime};

/// Earliest configured cutoff strictly after `now`.
///
/// Returns `None` when no slots are configured. A cutoff at exactly `now`
/// is treated as already passed; orders placed on the cutoff instant roll
/// over to the next occurrence.
pub fn next_cutoff(slots: &[NaiveTime], now: NaiveDateTime) -> Option<NaiveDateTime> {
    let today = now.date();
    for slot in slots {
        let candidate = today.and_time(*slot);
        if candidate > now {
            return Some(candidate);
        }
    }
    // All of today's cutoffs have passed; wrap to tomorrow's first slot.
    let first = slots.first()?;
    Some(today.succ_opt()?.and_time(*first))
}

/// Next occurrence of every configured slot, in slot order.
///
/// Used for the availability listing: each slot appears once, mapped to
/// today's instant if still upcoming, otherwise tomorrow's.
pub fn slot_occurrences(slots: &[NaiveTime], now: NaiveDateTime) -> Vec<NaiveDateTime> {
    let today = now.date();
    slots
        .iter()
        .filter_map(|slot| {
            let candidate = today.and_time(*slot);
            if candidate > now {
                Some(candidate)
            } else {
                Some(today.succ_opt()?.and_time(*slot))
            }
        })
        .collect()
}

/// Validate a slot configuration: cutoffs must be strictly increasing.
///
/// Strictly increasing also rules out duplicates, so two batches can never
/// target the same (shop, cutoff) pair through configuration alone.
pub fn validate_slots(slots: &[NaiveTime]) -> Result<(), SchedulerError> {
    for pair in slots.windows(2) {
        if pair[1] <= pair[0] {
            return Err(SchedulerError::Validation(format!(
                "slot cutoffs must be strictly increasing: {} is not after {}",
                pair[1], pair[0]
            )));
        }
    }
    Ok(())
}

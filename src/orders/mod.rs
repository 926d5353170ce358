//! Order Lifecycle Module
//!
//! Home of the order state machine, the single authority over order-status
//! mutation. Both the batch operations and the direct single-order delivery
//! flow go through it, so the two paths cannot diverge.

pub mod state_machine;

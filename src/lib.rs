//! Batch fulfillment scheduler for a campus-marketplace storefront.
//! Groups customer orders into time-boxed delivery batches per shop, enforces
//! cutoff-driven acceptance windows, locks batches into preparation, dispatches
//! them, and confirms each hand-off with a one-time code.

pub mod types; // Shared data structures and the error taxonomy.
pub mod api; // HTTP boundary (axum server and error mapping).
pub mod schedule; // Pure cutoff/slot resolution.
pub mod orders; // Order state machine.
pub mod otp; // One-time delivery code issue and verification.
pub mod store; // Persistence contract plus memory and sqlite backends.
pub mod batch; // Batch operations and the vendor orchestrator.
pub mod notify; // Fire-and-forget order-event publication.
pub mod config; // Configuration loading.

// Re-export commonly used types for easier access.
pub use types::*;
pub use config::Config;
pub use batch::BatchOrchestrator;

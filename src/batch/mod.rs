//! Batch Operations Module
//!
//! The write side of the scheduler:
//! - `BatchService`: assign / lock / start-delivery / cancel with
//!   all-or-nothing semantics across a batch's member orders
//! - `BatchOrchestrator`: vendor-facing facade composing the service, the
//!   schedule resolver and the OTP verifier, plus dashboard reads

mod service;
mod orchestrator;

#[cfg(test)]
mod tests;

pub use service::BatchService;
pub use orchestrator::BatchOrchestrator;

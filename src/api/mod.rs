//! HTTP Boundary Module
//!
//! Axum server exposing the scheduler's vendor and delivery operations,
//! with the error taxonomy mapped onto HTTP status codes.

mod server;

pub use server::Server;

//! Application layer - orchestration of domain logic.
//!
//! This layer wires the pure domain rules to shared state and time:
//! - Rate limiters (fixed windows per action class)
//! - Account lockout tracker (progressive lockout per identity)
//! - Origin guard (cross-site mutation checks)
//! - Audit logger (redacted, fire-and-forget)
//! - Security gate (everything above behind one builder)
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod audit;
pub mod circuit_breaker;
#[cfg(feature = "async")]
pub mod dispatcher;
pub mod gate;
pub mod limiter;
pub mod lockout;
pub mod metrics;
pub mod origin;
pub mod ports;
#[cfg(feature = "async")]
pub mod sweeper;

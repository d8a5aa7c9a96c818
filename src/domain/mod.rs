//! Domain layer - pure request-trust logic with no I/O.
//!
//! This layer contains the types and rules every gate shares:
//! - Error taxonomy and validation results
//! - Window and lockout policies
//! - Counter and lockout entries
//! - Constant-time secret comparison
//! - Sanitizers, upload checks and profile validators
//! - Audit event model and redaction
//!
//! All types in this layer are pure and easily testable.

pub mod audit;
pub mod counter;
pub mod error;
pub mod policy;
pub mod profile;
pub mod sanitize;
pub mod secret;
pub mod upload;

//! Test doubles for infrastructure adapters.
//!
//! Available in test builds and with the `test-helpers` feature.

pub mod audit;
pub mod clock;
pub mod layer;
pub mod translator;

pub use audit::MemoryAuditSink;
pub use clock::MockClock;
pub use layer::{CapturedEvent, MockCaptureLayer};
pub use translator::KeyTranslator;

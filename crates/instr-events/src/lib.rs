//! Instruction Events
//!
//! Watches the host document for elements added or removed outside this
//! system and fans the changes out to subscribers:
//! - Snapshot diffing ([`DeltaTracker`])
//! - Ordered, failure-isolated notification ([`Publisher`])
//! - A polling loop on its own tokio task ([`ChangeDetector`])

#![allow(missing_docs)]

pub mod delta;
pub mod detector;
pub mod subscriber;

pub use delta::{DeltaTracker, ElementDelta};
pub use detector::{ChangeDetector, DetectorConfig, DetectorHandle, DetectorStats};
pub use subscriber::{FnSubscriber, PublishReport, Publisher, Subscriber, SubscriberId};

use instr_core::HostError;

/// Errors raised by change detection
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// Initial host snapshot could not be taken
    #[error("host listing failed: {0}")]
    Host(#[from] HostError),

    /// Polling task panicked or was cancelled
    #[error("detector task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

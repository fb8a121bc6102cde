//! # sso-core
//!
//! Foundational types shared by the issuance crates: runtime configuration
//! and structured audit events.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod event;

pub use config::IssuanceConfig;
pub use event::{AuditSink, Event, EventBuilder, EventOutcome, EventType, TracingAuditSink};

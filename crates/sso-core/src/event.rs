//! Audit events for assertion issuance.
//!
//! Every security-relevant decision in the pipeline (signing applied or
//! skipped, issuance refused) is recorded as an [`Event`] and handed to an
//! [`AuditSink`]. Events carry:
//! - Timestamp (UTC)
//! - Event type and outcome
//! - Relying party and principal (when known)
//! - Source IP and session (when known)
//! - Free-form details

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    /// An assertion was built and handed back to the caller.
    AssertionIssued,
    /// A signature was applied to an assertion.
    AssertionSigned,
    /// Signing was not required for this relying party.
    AssertionSigningSkipped,
    /// Issuance was refused or failed.
    IssuanceError,
    /// Relying-party metadata was (re)loaded into the trust cache.
    MetadataRefreshed,
    /// Relying-party metadata could not be loaded.
    MetadataRefreshError,
}

/// Outcome of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded.
    Success,
    /// Operation failed.
    Failure,
}

/// A security event for audit logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier.
    pub id: Uuid,

    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Outcome of the event.
    pub outcome: EventOutcome,

    /// Relying party entity ID.
    pub relying_party: Option<String>,

    /// Principal name.
    pub principal: Option<String>,

    /// Source IP address.
    pub ip_address: Option<String>,

    /// Session index.
    pub session_id: Option<String>,

    /// Error message (for failure events).
    pub error: Option<String>,

    /// Additional details as key-value pairs.
    pub details: Vec<(String, String)>,
}

impl Event {
    /// Creates a new event builder.
    #[must_use]
    pub const fn builder(event_type: EventType) -> EventBuilder {
        EventBuilder::new(event_type)
    }

    /// Looks up a detail value by key.
    #[must_use]
    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Builder for creating events.
pub struct EventBuilder {
    event_type: EventType,
    outcome: EventOutcome,
    relying_party: Option<String>,
    principal: Option<String>,
    ip_address: Option<String>,
    session_id: Option<String>,
    error: Option<String>,
    details: Vec<(String, String)>,
}

impl EventBuilder {
    /// Creates a new event builder.
    #[must_use]
    pub const fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            outcome: EventOutcome::Success,
            relying_party: None,
            principal: None,
            ip_address: None,
            session_id: None,
            error: None,
            details: Vec::new(),
        }
    }

    /// Sets the outcome to failure with an error message.
    #[must_use]
    pub fn failure(mut self, error: impl Into<String>) -> Self {
        self.outcome = EventOutcome::Failure;
        self.error = Some(error.into());
        self
    }

    /// Sets the relying party.
    #[must_use]
    pub fn relying_party(mut self, entity_id: impl Into<String>) -> Self {
        self.relying_party = Some(entity_id.into());
        self
    }

    /// Sets the principal.
    #[must_use]
    pub fn principal(mut self, name: impl Into<String>) -> Self {
        self.principal = Some(name.into());
        self
    }

    /// Sets the IP address when one is known.
    #[must_use]
    pub fn ip_address(mut self, ip: Option<impl Into<String>>) -> Self {
        self.ip_address = ip.map(Into::into);
        self
    }

    /// Sets the session index when one is known.
    #[must_use]
    pub fn session(mut self, session_id: Option<impl Into<String>>) -> Self {
        self.session_id = session_id.map(Into::into);
        self
    }

    /// Adds a detail key-value pair.
    #[must_use]
    pub fn detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.push((key.into(), value.into()));
        self
    }

    /// Builds the event.
    #[must_use]
    pub fn build(self) -> Event {
        Event {
            id: Uuid::now_v7(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            outcome: self.outcome,
            relying_party: self.relying_party,
            principal: self.principal,
            ip_address: self.ip_address,
            session_id: self.session_id,
            error: self.error,
            details: self.details,
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    /// Records an event. Sinks must not fail the caller.
    fn record(&self, event: &Event);
}

/// Writes audit events to the `audit` tracing target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &Event) {
        let payload = serde_json::to_string(event).unwrap_or_default();
        match event.outcome {
            EventOutcome::Success => tracing::info!(
                target: "audit",
                event_type = ?event.event_type,
                relying_party = event.relying_party.as_deref().unwrap_or("-"),
                "{payload}"
            ),
            EventOutcome::Failure => tracing::warn!(
                target: "audit",
                event_type = ?event.event_type,
                relying_party = event.relying_party.as_deref().unwrap_or("-"),
                "{payload}"
            ),
        }
    }
}

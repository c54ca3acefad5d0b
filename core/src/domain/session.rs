//! Session lifecycle states and the events delivered to the presentation layer.

use std::fmt;

use super::resource::ResourceKind;
use super::spec::RowId;
use crate::error::ForwardError;

/// Lifecycle of one forward session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Stopped,
    Failed(ForwardError),
}

impl SessionState {
    /// Stopped and Failed allow no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed(_))
    }

    /// Connecting or Active.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connecting | Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// What happened to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The tunnel is up. Not terminal.
    Started,
    /// Stopped on request while connecting or active.
    StoppedByUser,
    /// The transport ended cleanly without a stop request.
    Closed,
    Failed(ForwardError),
}

impl SessionOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }

    /// State the session settles in after this outcome.
    pub fn resulting_state(&self) -> SessionState {
        match self {
            Self::Started => SessionState::Active,
            Self::StoppedByUser | Self::Closed => SessionState::Stopped,
            Self::Failed(reason) => SessionState::Failed(reason.clone()),
        }
    }
}

/// A session outcome tagged with the row it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub id: RowId,
    pub outcome: SessionOutcome,
}

impl SessionEvent {
    pub fn new(id: RowId, outcome: SessionOutcome) -> Self {
        Self { id, outcome }
    }

    /// One-line, row-scoped message for a notification dialog.
    pub fn message(&self) -> String {
        match &self.outcome {
            SessionOutcome::Started => format!("row {}: forwarding", self.id),
            SessionOutcome::StoppedByUser => format!("row {}: stopped", self.id),
            SessionOutcome::Closed => format!("row {}: tunnel closed", self.id),
            SessionOutcome::Failed(reason) => {
                let reason = reason.to_string();
                let first = reason.lines().next().unwrap_or_default();
                format!("row {}: {}", self.id, first)
            }
        }
    }
}

/// Result of an asynchronous discovery request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingEvent {
    Namespaces(Result<Vec<String>, ForwardError>),
    Resources {
        namespace: String,
        kind: ResourceKind,
        result: Result<Vec<String>, ForwardError>,
    },
}

/// Everything the notification bridge carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Session(SessionEvent),
    Listing(ListingEvent),
}

impl From<SessionEvent> for BridgeEvent {
    fn from(event: SessionEvent) -> Self {
        Self::Session(event)
    }
}

impl From<ListingEvent> for BridgeEvent {
    fn from(event: ListingEvent) -> Self {
        Self::Listing(event)
    }
}

//! Session outcome and constraint diagnostics

use super::tracking::TrackedElement;
use super::{Session, SessionId};
use crate::error::HyperGraphError;
use crate::graph::Identity;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MessageKind {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticMessage {
    pub kind: MessageKind,
    pub message: String,
    pub id: Option<Identity>,
    pub property: Option<String>,
}

impl DiagnosticMessage {
    pub fn error(message: impl Into<String>) -> Self {
        DiagnosticMessage {
            kind: MessageKind::Error,
            message: message.into(),
            id: None,
            property: None,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        DiagnosticMessage {
            kind: MessageKind::Warning,
            ..Self::error(message)
        }
    }

    pub fn for_element(mut self, id: Identity) -> Self {
        self.id = Some(id);
        self
    }

    pub fn for_property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

impl From<&HyperGraphError> for DiagnosticMessage {
    fn from(err: &HyperGraphError) -> Self {
        let message = DiagnosticMessage::error(err.to_string());
        match err.identity() {
            Some(id) => message.for_element(id.clone()),
            None => message,
        }
    }
}

impl fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MessageKind::Error => "error",
            MessageKind::Warning => "warning",
        };
        write!(f, "{}: {}", kind, self.message)?;
        if let Some(id) = &self.id {
            write!(f, " [{}", id)?;
            if let Some(property) = &self.property {
                write!(f, ".{}", property)?;
            }
            write!(f, "]")?;
        }
        Ok(())
    }
}

/// Outcome of a completed session
#[derive(Debug, Clone, Serialize)]
pub struct SessionResult {
    pub session_id: SessionId,
    pub aborted: bool,
    pub messages: Vec<DiagnosticMessage>,
    /// Elements the session touched
    pub involved: Vec<TrackedElement>,
}

impl SessionResult {
    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(DiagnosticMessage::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &DiagnosticMessage> {
        self.messages.iter().filter(|m| m.is_error())
    }

    pub fn is_committed(&self) -> bool {
        !self.aborted
    }
}

/// Rules checked once per touched element before a commit becomes final.
/// Returning an error diagnostic aborts the session.
pub trait ConstraintValidator: Send + Sync {
    fn name(&self) -> &str;

    fn implicit_validate(&self, session: &Session, element: &TrackedElement) -> Vec<DiagnosticMessage>;
}

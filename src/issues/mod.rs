//! Recoverable problems reported by batch operations

use crate::entries::EntryRef;
use crate::Result;
use serde::Serialize;
use std::fmt;

/// Category of a [`RelinkIssue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IssueKind {
    /// A reference could not be mapped into the destination
    UnresolvedReference,
    /// No package export backs an import
    UnresolvedImport,
    /// A payload could not be parsed, so its references were not rewritten
    UnparsedPayload,
    /// One item of a batch failed outright
    ItemFailed,
}

/// A problem a batch operation reported and moved past
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelinkIssue {
    /// Category
    pub kind: IssueKind,
    /// Entry the issue was found on, in the package being written
    pub entry: Option<EntryRef>,
    /// What went wrong
    pub message: String,
}

impl RelinkIssue {
    /// Build an issue of any kind
    pub fn new(kind: IssueKind, entry: Option<EntryRef>, message: impl Into<String>) -> Self {
        Self { kind, entry, message: message.into() }
    }

    /// A reference on `entry` had no destination counterpart
    pub fn unresolved_reference(entry: EntryRef, message: impl Into<String>) -> Self {
        Self::new(IssueKind::UnresolvedReference, Some(entry), message)
    }

    /// The payload of `entry` could not be parsed
    pub fn unparsed_payload(entry: EntryRef, message: impl Into<String>) -> Self {
        Self::new(IssueKind::UnparsedPayload, Some(entry), message)
    }
}

impl fmt::Display for RelinkIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.entry {
            Some(entry) => write!(f, "{:?} at {}: {}", self.kind, entry, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}

/// Render a report as pretty JSON
pub fn issues_to_json(issues: &[RelinkIssue]) -> Result<String> {
    Ok(serde_json::to_string_pretty(issues)?)
}

//! Fixed-width identifiers for events and tasks.

use super::IdentifierError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Width of an event identifier in hex characters.
const EVENT_UUID_LEN: usize = 32;

/// Width of a task identifier: event identifier followed by a task-local id.
const TASK_UUID_LEN: usize = EVENT_UUID_LEN * 2;

fn validate_hex(raw: &str, expected: usize) -> Result<String, IdentifierError> {
    let normalized = raw.trim().to_ascii_lowercase();
    if normalized.len() != expected {
        return Err(IdentifierError::WrongLength {
            value: raw.to_owned(),
            expected,
        });
    }
    if !normalized.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(IdentifierError::NotHex(raw.to_owned()));
    }
    Ok(normalized)
}

/// Identifier of one source-control event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventUuid(String);

impl EventUuid {
    /// Creates a new random event identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Parses a 32-character hex event identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is not exactly 32 hex
    /// characters.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        validate_hex(value, EVENT_UUID_LEN).map(Self)
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<String> for EventUuid {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventUuid> for String {
    fn from(value: EventUuid) -> Self {
        value.0
    }
}

impl AsRef<str> for EventUuid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for EventUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one task: the owning event UUID followed by a task-local
/// UUID, both 32 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskUuid(String);

impl TaskUuid {
    /// Creates a new random task identifier belonging to `event`.
    #[must_use]
    pub fn new_for_event(event: &EventUuid) -> Self {
        Self(format!("{}{}", event.as_str(), Uuid::new_v4().simple()))
    }

    /// Parses a 64-character hex task identifier.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value is not exactly 64 hex
    /// characters.
    pub fn parse(value: &str) -> Result<Self, IdentifierError> {
        validate_hex(value, TASK_UUID_LEN).map(Self)
    }

    /// Returns the identifier of the event that owns this task.
    #[must_use]
    pub fn event_uuid(&self) -> EventUuid {
        let (event, _) = self.0.split_at(EVENT_UUID_LEN);
        EventUuid(event.to_owned())
    }

    /// Returns the identifier as `str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for TaskUuid {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TaskUuid> for String {
    fn from(value: TaskUuid) -> Self {
        value.0
    }
}

impl AsRef<str> for TaskUuid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for TaskUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//! Event records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row of the events table
///
/// Events are matched across environments by `(name, date)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Environment-local surrogate key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Event title
    pub name: String,

    /// Calendar date as stored by the backend (ISO 8601)
    pub date: String,

    /// Long description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Absolute URL of the event flyer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flyer_url: Option<String>,

    /// Social media link for the event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_url: Option<String>,

    /// Semester tag, e.g. `sp25`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semester: Option<String>,

    /// Columns not modelled above, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create an event from its natural key
    pub fn new(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: date.into(),
            ..Default::default()
        }
    }

    /// Set the surrogate id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the semester tag
    pub fn with_semester(mut self, semester: impl Into<String>) -> Self {
        self.semester = Some(semester.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Natural key of this event
    pub fn key(&self) -> EventKey {
        EventKey {
            name: self.name.clone(),
            date: self.date.clone(),
        }
    }
}

/// The `(name, date)` natural key of an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventKey {
    /// Event title
    pub name: String,
    /// Calendar date
    pub date: String,
}

impl EventKey {
    /// Create a new key
    pub fn new(name: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            date: date.into(),
        }
    }
}

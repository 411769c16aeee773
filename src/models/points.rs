//! Points ledger records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row of the points table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointsRecord {
    /// Environment-local surrogate key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Foreign key to `Member::id` in the same environment
    pub member_id: i64,

    /// Points awarded (may be negative for corrections)
    pub points: i64,

    /// Semester tag the points count toward
    pub semester: String,

    /// Why the points were awarded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Columns not modelled above, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PointsRecord {
    /// Create a new points record
    pub fn new(member_id: i64, points: i64, semester: impl Into<String>) -> Self {
        Self {
            member_id,
            points,
            semester: semester.into(),
            ..Default::default()
        }
    }

    /// Set the surrogate id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set the reason
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

//! Member records
//!
//! A member is identified across environments by `netid`; the `id` column is
//! assigned by each environment independently.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A row of the members table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Environment-local surrogate key (never copied between environments)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Natural key, stable across environments
    pub netid: String,

    /// Given name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    /// Family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Expected graduation year; numeric strings are accepted
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_grad_year"
    )]
    pub grad_year: Option<i32>,

    /// Declared major
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,

    /// Board or committee roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,

    /// Free-text biography
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    /// LinkedIn profile link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin_url: Option<String>,

    /// GitHub profile link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,

    /// Absolute URL of the primary headshot, rooted at the owning environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headshot_url: Option<String>,

    /// Absolute URL of the secondary headshot, rooted at the owning environment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_headshot_url: Option<String>,

    /// Columns not modelled above, carried through unchanged
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Member {
    /// Create a member with only its natural key set
    pub fn new(netid: impl Into<String>) -> Self {
        Self {
            netid: netid.into(),
            ..Default::default()
        }
    }

    /// Set the surrogate id
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Set first and last name
    pub fn with_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    /// Set the primary headshot URL
    pub fn with_headshot_url(mut self, url: impl Into<String>) -> Self {
        self.headshot_url = Some(url.into());
        self
    }

    /// Set the secondary headshot URL
    pub fn with_secondary_headshot_url(mut self, url: impl Into<String>) -> Self {
        self.secondary_headshot_url = Some(url.into());
        self
    }

    /// Set the roles list
    pub fn with_roles(mut self, roles: Vec<String>) -> Self {
        self.roles = Some(roles);
        self
    }

    /// The netid in its canonical lowercase form
    pub fn normalized_netid(&self) -> String {
        normalize_netid(&self.netid)
    }
}

/// The `(id, netid)` projection used to build remap tables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberKey {
    /// Environment-local surrogate key
    pub id: i64,
    /// Natural key
    pub netid: String,
}

impl MemberKey {
    /// Create a new key pair
    pub fn new(id: i64, netid: impl Into<String>) -> Self {
        Self {
            id,
            netid: netid.into(),
        }
    }
}

/// Some deployments keep `grad_year` in a text column
fn deserialize_grad_year<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|year| i32::try_from(year).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid grad_year: {}", n))),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(None),
        Some(Value::String(raw)) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid grad_year: {}", raw))),
        Some(other) => Err(D::Error::custom(format!("invalid grad_year: {}", other))),
    }
}

/// Canonical form of a netid
pub fn normalize_netid(netid: &str) -> String {
    netid.trim().to_lowercase()
}

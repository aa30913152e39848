//! Entity-selection context for a query.

use std::str::FromStr;

use serde::Serialize;

use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    #[serde(rename = "publication")]
    Publication,
    #[serde(rename = "author")]
    Author,
    #[serde(rename = "fieldOfStudy")]
    FieldOfStudy,
}

impl ScopeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ScopeKind::Publication => "publication",
            ScopeKind::Author => "author",
            ScopeKind::FieldOfStudy => "fieldOfStudy",
        }
    }
}

impl FromStr for ScopeKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publication" => Ok(ScopeKind::Publication),
            "author" => Ok(ScopeKind::Author),
            "fieldOfStudy" => Ok(ScopeKind::FieldOfStudy),
            other => Err(CoreError::UnknownScope(other.to_string())),
        }
    }
}

/// A validated scope: which publications a query is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One publication by DOI, or every publication when `None`.
    Publication(Option<String>),
    Author(i64),
    FieldOfStudy(i64),
}

impl Scope {
    /// Build a scope from the raw `scope` kind and `id` request parameters.
    ///
    /// Author and field-of-study scopes require an integer id; a publication
    /// scope takes the id as a DOI and treats a missing or blank id as "all".
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownScope`] for an unrecognised kind and
    /// [`CoreError::InvalidParameter`] when a required id is missing or not an
    /// integer.
    pub fn parse(kind: &str, id: Option<&str>) -> Result<Self, CoreError> {
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        match kind.parse::<ScopeKind>()? {
            ScopeKind::Publication => Ok(Scope::Publication(id.map(ToOwned::to_owned))),
            ScopeKind::Author => parse_id(id).map(Scope::Author),
            ScopeKind::FieldOfStudy => parse_id(id).map(Scope::FieldOfStudy),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ScopeKind {
        match self {
            Scope::Publication(_) => ScopeKind::Publication,
            Scope::Author(_) => ScopeKind::Author,
            Scope::FieldOfStudy(_) => ScopeKind::FieldOfStudy,
        }
    }
}

fn parse_id(id: Option<&str>) -> Result<i64, CoreError> {
    let raw = id.ok_or_else(|| CoreError::InvalidParameter {
        name: "id",
        reason: "required for this scope".to_string(),
    })?;
    raw.parse::<i64>().map_err(|e| CoreError::InvalidParameter {
        name: "id",
        reason: e.to_string(),
    })
}

//! Audit record and the closed category/status vocabularies.
//!
//! The category set is derived from the data security lifecycle: every
//! audited action is one of nine data-lifecycle operations, each carrying a
//! base risk priority. The [`AuditRecord`] is the immutable, fully-populated
//! entry produced by the formatter and handed to sinks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrustLogError};

/// The type of data-lifecycle action being audited.
///
/// Categories form a closed set; anything else is rejected with
/// [`TrustLogError::InvalidCategory`] before a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// A user authenticated against the service.
    Login,
    /// New data was created.
    Create,
    /// Data was persisted.
    Store,
    /// Existing data was modified.
    Change,
    /// Data was moved to long-term storage.
    Archive,
    /// Data was read without modification.
    View,
    /// Data was processed or otherwise acted upon.
    Use,
    /// Data was made available to another party.
    Share,
    /// Data was permanently removed.
    Destroy,
}

impl Category {
    /// Every member of the category set, in base-priority order.
    pub const ALL: [Self; 9] = [
        Self::Login,
        Self::Create,
        Self::Store,
        Self::View,
        Self::Archive,
        Self::Destroy,
        Self::Change,
        Self::Use,
        Self::Share,
    ];

    /// Returns the lowercase wire name of this category.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Create => "create",
            Self::Store => "store",
            Self::Change => "change",
            Self::Archive => "archive",
            Self::View => "view",
            Self::Use => "use",
            Self::Share => "share",
            Self::Destroy => "destroy",
        }
    }

    /// Returns the base risk priority for this category.
    ///
    /// The base priority applies when the acting user owns the affected
    /// data (or no data is involved); cross-owner access escalates to 4
    /// regardless of category.
    #[must_use]
    pub const fn base_priority(&self) -> u8 {
        match self {
            Self::Login | Self::Create | Self::Store => 1,
            Self::View | Self::Archive | Self::Destroy => 2,
            Self::Change | Self::Use | Self::Share => 3,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = TrustLogError;

    /// Parses a category name case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "login" => Ok(Self::Login),
            "create" => Ok(Self::Create),
            "store" => Ok(Self::Store),
            "change" => Ok(Self::Change),
            "archive" => Ok(Self::Archive),
            "view" => Ok(Self::View),
            "use" => Ok(Self::Use),
            "share" => Ok(Self::Share),
            "destroy" => Ok(Self::Destroy),
            _ => Err(TrustLogError::InvalidCategory {
                category: s.to_string(),
            }),
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The action completed.
    Success,
    /// The action was attempted and failed.
    Failed,
}

impl Status {
    /// Returns the lowercase wire name of this status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<bool> for Status {
    fn from(success: bool) -> Self {
        if success { Self::Success } else { Self::Failed }
    }
}

/// An immutable, fully-populated audit entry.
///
/// Constructed once by the formatter and never mutated afterwards; sinks
/// treat it as read-only. The serialized field order is the canonical wire
/// order and matches the struct declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Creation instant, captured at format time.
    #[serde(with = "iso8601")]
    pub time: DateTime<Utc>,
    /// Name of the service emitting the record.
    pub source_name: String,
    /// Outward-facing IPv4 address of the emitting host.
    pub source_ip: String,
    /// Acting user identifier.
    pub user_name: String,
    /// Acting user's IP address.
    pub user_ip: String,
    /// Session identifier.
    pub session: String,
    /// Normalized action category.
    pub category: Category,
    /// Risk priority, 1 (lowest) to 4 (highest).
    pub priority: u8,
    /// Outcome of the audited action.
    pub status: Status,
    /// Owner of the affected data, or `-` if no data is involved.
    pub data_owner: String,
    /// Identifier of the affected data, or `-`.
    pub data_id: String,
    /// Human-readable name of the affected data, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_name: Option<String>,
    /// Free-text justification for the audited action.
    pub reason: String,
}

impl AuditRecord {
    /// Serializes the record to its canonical JSON form.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(TrustLogError::from)
    }

    /// Renders the record as a console line: `+ <json>`.
    pub fn console_line(&self) -> Result<String> {
        Ok(format!("+ {}", self.to_json()?))
    }
}

/// ISO-8601 timestamps with millisecond precision and a `Z` suffix.
mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(
        time: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|time| time.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            time: "2024-05-01T12:00:00.000Z".parse().unwrap(),
            source_name: "user-service".to_string(),
            source_ip: "203.0.113.7".to_string(),
            user_name: "alice".to_string(),
            user_ip: "1.2.3.4".to_string(),
            session: "s1".to_string(),
            category: Category::Share,
            priority: 4,
            status: Status::Success,
            data_owner: "bob".to_string(),
            data_id: "d1".to_string(),
            data_name: None,
            reason: "requested".to_string(),
        }
    }

    // ===================
    // Category Tests
    // ===================

    #[test_case(Category::Login, 1 ; "login")]
    #[test_case(Category::Create, 1 ; "create")]
    #[test_case(Category::Store, 1 ; "store")]
    #[test_case(Category::View, 2 ; "view")]
    #[test_case(Category::Archive, 2 ; "archive")]
    #[test_case(Category::Destroy, 2 ; "destroy")]
    #[test_case(Category::Change, 3 ; "change")]
    #[test_case(Category::Use, 3 ; "use_category")]
    #[test_case(Category::Share, 3 ; "share")]
    fn base_priorities(category: Category, expected: u8) {
        assert_eq!(category.base_priority(), expected);
    }

    #[test_case("Login", Category::Login ; "capitalized")]
    #[test_case("SHARE", Category::Share ; "uppercase")]
    #[test_case("destroy", Category::Destroy ; "lowercase")]
    #[test_case("vIeW", Category::View ; "mixed case")]
    fn category_parse_is_case_insensitive(raw: &str, expected: Category) {
        assert_eq!(raw.parse::<Category>().unwrap(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("publish" ; "unknown word")]
    #[test_case("LOGIN " ; "trailing space")]
    fn category_parse_rejects_unknown(raw: &str) {
        let err = raw.parse::<Category>().unwrap_err();
        assert!(matches!(
            err,
            TrustLogError::InvalidCategory { category } if category == raw
        ));
    }

    #[test]
    fn category_wire_names_are_lowercase() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{category}\""));
        }
    }

    #[test]
    fn category_all_covers_the_set() {
        assert_eq!(Category::ALL.len(), 9);
        for category in Category::ALL {
            assert!((1..=3).contains(&category.base_priority()));
        }
    }

    // ===================
    // Status Tests
    // ===================

    #[test]
    fn status_from_bool() {
        assert_eq!(Status::from(true), Status::Success);
        assert_eq!(Status::from(false), Status::Failed);
    }

    #[test]
    fn status_serialization() {
        assert_eq!(serde_json::to_string(&Status::Success).unwrap(), "\"success\"");
        assert_eq!(serde_json::to_string(&Status::Failed).unwrap(), "\"failed\"");
    }

    // ===================
    // AuditRecord Tests
    // ===================

    #[test]
    fn record_serializes_in_canonical_field_order() {
        let json = sample_record().to_json().unwrap();
        let order = [
            "\"time\"",
            "\"source_name\"",
            "\"source_ip\"",
            "\"user_name\"",
            "\"user_ip\"",
            "\"session\"",
            "\"category\"",
            "\"priority\"",
            "\"status\"",
            "\"data_owner\"",
            "\"data_id\"",
            "\"reason\"",
        ];
        let positions: Vec<usize> = order
            .iter()
            .map(|field| json.find(field).unwrap_or_else(|| panic!("missing {field}")))
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted, "field order drifted: {json}");
    }

    #[test]
    fn record_time_uses_millisecond_precision() {
        let json = sample_record().to_json().unwrap();
        assert!(json.starts_with("{\"time\":\"2024-05-01T12:00:00.000Z\""));
    }

    #[test]
    fn record_omits_absent_data_name() {
        let json = sample_record().to_json().unwrap();
        assert!(!json.contains("data_name"));

        let mut named = sample_record();
        named.data_name = Some("quarterly report".to_string());
        let json = named.to_json().unwrap();
        assert!(json.contains("\"data_name\":\"quarterly report\""));
    }

    #[test]
    fn record_console_line_shape() {
        let line = sample_record().console_line().unwrap();
        assert!(line.starts_with("+ {\"time\":"));
        assert!(!line.ends_with('\n'));
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = sample_record();
        let json = record.to_json().unwrap();
        let parsed: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}

//! Payload validation and record formatting.
//!
//! The formatter turns one `log` call into one or more immutable
//! [`AuditRecord`]s: it normalizes the category, checks the required-field
//! contract, captures time and source IP once per call, and derives the
//! risk priority for every affected data item.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, TrustLogError};
use crate::net::SourceIpResolver;
use crate::record::{AuditRecord, Category, Status};

/// Sentinel used for the owner and id when no data is involved.
pub const NO_DATA: &str = "-";

/// A single data item affected by the audited action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataItem {
    /// User that owns the data.
    pub owner: String,
    /// Identifier of the data.
    pub id: String,
    /// Human-readable name, if any.
    pub name: Option<String>,
}

impl DataItem {
    /// Creates a data item without a display name.
    #[must_use]
    pub fn new(owner: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            id: id.into(),
            name: None,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The sentinel item substituted when an action touches no data.
    #[must_use]
    pub fn sentinel() -> Self {
        Self::new(NO_DATA, NO_DATA)
    }
}

/// The caller-supplied half of an audit record.
///
/// An empty `data` vector means the action touched no data and normalizes
/// to a single sentinel item at format time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// Acting user identifier.
    pub user_name: String,
    /// Acting user's IP address.
    pub user_ip: String,
    /// Session identifier.
    pub session: String,
    /// Outcome of the audited action.
    pub status: Status,
    /// Data items affected by the action.
    pub data: Vec<DataItem>,
    /// Free-text justification.
    pub reason: String,
}

impl Payload {
    /// Creates a payload with no associated data items.
    #[must_use]
    pub fn new(
        user_name: impl Into<String>,
        user_ip: impl Into<String>,
        session: impl Into<String>,
        status: Status,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            user_name: user_name.into(),
            user_ip: user_ip.into(),
            session: session.into(),
            status,
            data: Vec::new(),
            reason: reason.into(),
        }
    }

    /// Appends one affected data item.
    #[must_use]
    pub fn with_data(mut self, item: DataItem) -> Self {
        self.data.push(item);
        self
    }

    /// Replaces the data item list.
    #[must_use]
    pub fn with_data_items(mut self, items: Vec<DataItem>) -> Self {
        self.data = items;
        self
    }

    /// Builds a payload from an untyped JSON object.
    ///
    /// Every required field (`user_name`, `user_ip`, `session`, `status`,
    /// `data_owner`, `data_id`, `reason`) must be present, otherwise
    /// [`TrustLogError::MalformedPayload`] names the first missing one.
    /// `status` accepts `"success"`/`"failed"` or a boolean. A `data` array
    /// of `{owner, id, name?}` objects may replace the single
    /// `data_owner`/`data_id`/`data_name` triple.
    pub fn from_value(value: &Value) -> Result<Self> {
        let user_name = required_str(value, "user_name")?;
        let user_ip = required_str(value, "user_ip")?;
        let session = required_str(value, "session")?;
        let status = status_field(value)?;

        let data = match value.get("data") {
            Some(Value::Array(items)) => items
                .iter()
                .map(data_item)
                .collect::<Result<Vec<DataItem>>>()?,
            // Null and absent both mean the single-object form.
            Some(Value::Null) | None => {
                let owner = required_str(value, "data_owner")?;
                let id = required_str(value, "data_id")?;
                let name = optional_str(value, "data_name")?;
                vec![DataItem { owner, id, name }]
            }
            Some(_) => {
                return Err(TrustLogError::MalformedPayload {
                    field: "data".to_string(),
                });
            }
        };

        let reason = required_str(value, "reason")?;

        Ok(Self {
            user_name,
            user_ip,
            session,
            status,
            data,
            reason,
        })
    }
}

fn required_str(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| TrustLogError::MalformedPayload {
            field: field.to_string(),
        })
}

fn optional_str(value: &Value, field: &str) -> Result<Option<String>> {
    match value.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TrustLogError::MalformedPayload {
            field: field.to_string(),
        }),
    }
}

fn status_field(value: &Value) -> Result<Status> {
    match value.get("status") {
        Some(Value::String(s)) => match s.as_str() {
            "success" => Ok(Status::Success),
            "failed" => Ok(Status::Failed),
            _ => Err(TrustLogError::MalformedPayload {
                field: "status".to_string(),
            }),
        },
        Some(Value::Bool(success)) => Ok(Status::from(*success)),
        _ => Err(TrustLogError::MalformedPayload {
            field: "status".to_string(),
        }),
    }
}

fn data_item(value: &Value) -> Result<DataItem> {
    let owner = required_str(value, "owner").map_err(|_| TrustLogError::MalformedPayload {
        field: "data.owner".to_string(),
    })?;
    let id = required_str(value, "id").map_err(|_| TrustLogError::MalformedPayload {
        field: "data.id".to_string(),
    })?;
    let name = optional_str(value, "name").map_err(|_| TrustLogError::MalformedPayload {
        field: "data.name".to_string(),
    })?;
    Ok(DataItem { owner, id, name })
}

/// Derives the risk priority for one record.
///
/// Access to data owned by someone else is always maximal risk: when the
/// owner is recorded (not the `-` sentinel) and differs from the acting
/// user, the priority is 4 regardless of category. Otherwise the category's
/// base priority applies. Pure and deterministic.
#[must_use]
pub fn priority_for(category: Category, user_name: &str, data_owner: &str) -> u8 {
    if data_owner != NO_DATA && data_owner != user_name {
        4
    } else {
        category.base_priority()
    }
}

/// Validates payloads and produces immutable audit records.
///
/// Time and the host source IP are captured once per `format` call, so
/// every record of a multi-item call (and every sink that receives it)
/// sees identical enrichment.
#[derive(Debug, Clone)]
pub struct RecordFormatter {
    source_name: String,
    resolver: SourceIpResolver,
}

impl RecordFormatter {
    /// Creates a formatter for the given emitting service.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::InvalidSource`] when the name is empty or
    /// blank.
    pub fn new(source_name: impl Into<String>) -> Result<Self> {
        let source_name = source_name.into();
        if source_name.trim().is_empty() {
            return Err(TrustLogError::InvalidSource);
        }
        Ok(Self {
            source_name,
            resolver: SourceIpResolver::new(),
        })
    }

    /// Replaces the source-IP resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: SourceIpResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the emitting service name.
    #[must_use]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Formats one logical event into one record per affected data item.
    ///
    /// All validation happens before any enrichment is captured; a
    /// formatting error means nothing was produced or sent.
    pub fn format(&self, category: &str, payload: &Payload) -> Result<Vec<AuditRecord>> {
        let category: Category = category.parse()?;

        let time = Utc::now();
        let source_ip = self.resolver.resolve();

        let items: Vec<DataItem> = if payload.data.is_empty() {
            vec![DataItem::sentinel()]
        } else {
            payload.data.clone()
        };

        debug!(
            category = %category,
            items = items.len(),
            source = %self.source_name,
            "formatting audit event"
        );

        Ok(items
            .into_iter()
            .map(|item| AuditRecord {
                time,
                source_name: self.source_name.clone(),
                source_ip: source_ip.clone(),
                user_name: payload.user_name.clone(),
                user_ip: payload.user_ip.clone(),
                session: payload.session.clone(),
                category,
                priority: priority_for(category, &payload.user_name, &item.owner),
                status: payload.status,
                data_owner: item.owner,
                data_id: item.id,
                data_name: item.name,
                reason: payload.reason.clone(),
            })
            .collect())
    }
}

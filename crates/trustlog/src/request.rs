//! Request-identity extraction.
//!
//! Services behind an authenticating gateway receive the acting user in
//! designated headers and the session token in the cookie header. This
//! module turns that header set into the `{user_name, user_ip, session}`
//! triple the formatter consumes.

use std::collections::HashMap;

use crate::error::{Result, TrustLogError};
use crate::format::Payload;
use crate::record::Status;

/// Header carrying the authenticated user name.
pub const USER_HEADER: &str = "x-consumer-username";
/// Header carrying the client IP as seen by the gateway.
pub const IP_HEADER: &str = "x-real-ip";
/// Header carrying cookies, including `session=<token>|...`.
pub const COOKIE_HEADER: &str = "cookie";

/// The acting user extracted from an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Authenticated user name.
    pub user_name: String,
    /// Client IP address.
    pub user_ip: String,
    /// Session token, truncated at the first `|`.
    pub session: String,
}

impl Identity {
    /// Extracts the identity from a header map.
    ///
    /// Header names are matched case-insensitively. The session token is
    /// the value of the `session` cookie up to the first `|` separator.
    ///
    /// # Errors
    ///
    /// Returns [`TrustLogError::MalformedPayload`] naming the missing
    /// header or cookie.
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self> {
        let get = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        };
        let missing = |field: &str| TrustLogError::MalformedPayload {
            field: field.to_string(),
        };

        let user_name = get(USER_HEADER).ok_or_else(|| missing(USER_HEADER))?;
        let user_ip = get(IP_HEADER).ok_or_else(|| missing(IP_HEADER))?;
        let session = get(COOKIE_HEADER)
            .and_then(session_token)
            .ok_or_else(|| missing("session"))?;

        Ok(Self {
            user_name: user_name.to_string(),
            user_ip: user_ip.to_string(),
            session,
        })
    }

    /// Builds a payload around this identity.
    #[must_use]
    pub fn into_payload(self, status: Status, reason: impl Into<String>) -> Payload {
        Payload::new(self.user_name, self.user_ip, self.session, status, reason)
    }
}

fn session_token(cookie: &str) -> Option<String> {
    cookie
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("session="))
        .map(|token| token.split('|').next().unwrap_or(token).to_string())
}

//! Client-facing session cookie descriptor

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use session_shared::config::SessionSettings;
use session_shared::SameSitePolicy;
use std::fmt;

/// Everything the HTTP layer needs to emit a `Set-Cookie` header.
/// Derived from policy; never authoritative on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub max_age: i64,
    pub expires: DateTime<Utc>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSitePolicy,
}

impl SessionCookie {
    pub fn issue(settings: &SessionSettings, token: &str) -> Self {
        Self::issue_at(settings, token, Utc::now())
    }

    pub fn issue_at(settings: &SessionSettings, token: &str, now: DateTime<Utc>) -> Self {
        Self {
            name: settings.cookie_name.clone(),
            value: token.to_string(),
            domain: settings.domain.clone(),
            path: settings.path.clone(),
            max_age: settings.max_age,
            expires: Duration::try_seconds(settings.max_age)
                .and_then(|age| now.checked_add_signed(age))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            secure: settings.secure,
            http_only: settings.http_only,
            same_site: settings.same_site,
        }
    }

    /// Cookie that clears the session on the client.
    pub fn expired(settings: &SessionSettings) -> Self {
        Self::expired_at(settings, Utc::now())
    }

    pub fn expired_at(settings: &SessionSettings, now: DateTime<Utc>) -> Self {
        // Expires as well as Max-Age=0: not every client honours the latter
        Self {
            value: String::new(),
            max_age: 0,
            expires: now,
            ..Self::issue_at(settings, "", now)
        }
    }

    pub fn is_expired(&self) -> bool {
        self.max_age <= 0
    }
}

impl fmt::Display for SessionCookie {
    /// Renders the value of a `Set-Cookie` header.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)?;
        if !self.path.is_empty() {
            write!(f, "; Path={}", self.path)?;
        }
        if !self.domain.is_empty() {
            write!(f, "; Domain={}", self.domain)?;
        }
        write!(f, "; Max-Age={}", self.max_age.max(0))?;
        write!(f, "; Expires={}", self.expires.format("%a, %d %b %Y %H:%M:%S GMT"))?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        if self.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = self.same_site.as_attribute() {
            write!(f, "; SameSite={}", same_site)?;
        }
        Ok(())
    }
}

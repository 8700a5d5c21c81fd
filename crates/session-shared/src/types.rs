//! Common types

use serde::{Deserialize, Serialize};
use std::fmt;

/// `SameSite` attribute applied to issued session cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SameSitePolicy {
    #[default]
    Strict,
    Lax,
    None,
    /// Leave the attribute off and let the client decide.
    Default,
}

impl SameSitePolicy {
    /// Attribute value as written in a `Set-Cookie` header, if any.
    pub fn as_attribute(&self) -> Option<&'static str> {
        match self {
            SameSitePolicy::Strict => Some("Strict"),
            SameSitePolicy::Lax => Some("Lax"),
            SameSitePolicy::None => Some("None"),
            SameSitePolicy::Default => None,
        }
    }
}

impl fmt::Display for SameSitePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_attribute().unwrap_or("Default"))
    }
}

/// Output format of the console log layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

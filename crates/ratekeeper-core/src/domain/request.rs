/// Identifier used when no client address can be resolved.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Transport-neutral description of the request being limited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub ip: Option<String>,
    pub path: String,
    pub method: String,
    pub user_id: Option<String>,
}

impl RequestMeta {
    pub fn new(ip: Option<String>, path: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            ip,
            path: path.into(),
            method: method.into(),
            user_id: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Client IP, or [`UNKNOWN_IDENTIFIER`] when unresolved.
    pub fn ip_or_unknown(&self) -> &str {
        self.ip.as_deref().unwrap_or(UNKNOWN_IDENTIFIER)
    }
}

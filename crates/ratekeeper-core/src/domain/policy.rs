//! Rate limit policy - the configuration a call site checks against.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::domain::RequestMeta;
use crate::error::PolicyError;

/// Predicate that bypasses limiting for a request when it returns true.
pub type SkipFn = Arc<dyn Fn(&RequestMeta) -> bool + Send + Sync>;

/// Custom identifier generator. `None` falls back to the client IP.
pub type IdentifierFn = Arc<dyn Fn(&RequestMeta) -> Option<String> + Send + Sync>;

/// Verdict to use when the counter store cannot be consulted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Allow the request through.
    #[default]
    Open,
    /// Reject the request.
    Closed,
}

impl FromStr for FailureMode {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(FailureMode::Open),
            "closed" => Ok(FailureMode::Closed),
            other => Err(PolicyError::InvalidFailureMode(other.to_string())),
        }
    }
}

/// Payload returned to a rejected caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RejectionMessage {
    /// Rendered as `{"error": <text>}`.
    Text(String),
    /// Rendered verbatim.
    Json(Value),
}

impl RejectionMessage {
    /// JSON body sent on rejection.
    pub fn to_body(&self) -> Value {
        match self {
            RejectionMessage::Text(text) => json!({ "error": text }),
            RejectionMessage::Json(value) => value.clone(),
        }
    }

    /// Human readable form, used where only a string fits (GraphQL errors).
    pub fn summary(&self) -> String {
        match self {
            RejectionMessage::Text(text) => text.clone(),
            RejectionMessage::Json(value) => value
                .get("error")
                .or_else(|| value.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
        }
    }
}

impl From<&str> for RejectionMessage {
    fn from(text: &str) -> Self {
        RejectionMessage::Text(text.to_string())
    }
}

impl From<String> for RejectionMessage {
    fn from(text: String) -> Self {
        RejectionMessage::Text(text)
    }
}

/// Fixed-window rate limit policy.
///
/// Built through [`RateLimitPolicy::new`], which rejects a zero window or a
/// zero max, so every instance is valid.
#[derive(Clone)]
pub struct RateLimitPolicy {
    name: String,
    window: Duration,
    max: u32,
    key_prefix: String,
    message: RejectionMessage,
    status_code: u16,
    failure_mode: FailureMode,
    skip: Option<SkipFn>,
    identifier: Option<IdentifierFn>,
}

impl RateLimitPolicy {
    pub const DEFAULT_STATUS_CODE: u16 = 429;
    pub const DEFAULT_MESSAGE: &'static str = "Too many requests, please try again later.";

    pub fn new(name: impl Into<String>, window: Duration, max: u32) -> Result<Self, PolicyError> {
        if window.is_zero() {
            return Err(PolicyError::ZeroWindow);
        }
        if max == 0 {
            return Err(PolicyError::ZeroMax);
        }

        let name = name.into();
        Ok(Self {
            key_prefix: format!("rl:{}:", name),
            name,
            window,
            max,
            message: RejectionMessage::from(Self::DEFAULT_MESSAGE),
            status_code: Self::DEFAULT_STATUS_CODE,
            failure_mode: FailureMode::default(),
            skip: None,
            identifier: None,
        })
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<RejectionMessage>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_skip<F>(mut self, skip: F) -> Self
    where
        F: Fn(&RequestMeta) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(skip));
        self
    }

    pub fn with_identifier<F>(mut self, identifier: F) -> Self
    where
        F: Fn(&RequestMeta) -> Option<String> + Send + Sync + 'static,
    {
        self.identifier = Some(Arc::new(identifier));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn key_prefix(&self) -> &str {
        &self.key_prefix
    }

    pub fn message(&self) -> &RejectionMessage {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn failure_mode(&self) -> FailureMode {
        self.failure_mode
    }

    /// Whether the request bypasses limiting entirely.
    pub fn should_skip(&self, meta: &RequestMeta) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(meta))
    }

    /// Identifier for a request: the custom generator, else the client IP,
    /// else `"unknown"`.
    pub fn identifier_for(&self, meta: &RequestMeta) -> String {
        self.identifier
            .as_ref()
            .and_then(|generate| generate(meta))
            .unwrap_or_else(|| meta.ip_or_unknown().to_string())
    }

    /// Counter key for an identifier.
    pub fn key_for(&self, identifier: &str) -> String {
        format!("{}{}", self.key_prefix, identifier)
    }
}

impl fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("name", &self.name)
            .field("window", &self.window)
            .field("max", &self.max)
            .field("key_prefix", &self.key_prefix)
            .field("message", &self.message)
            .field("status_code", &self.status_code)
            .field("failure_mode", &self.failure_mode)
            .field("skip", &self.skip.is_some())
            .field("identifier", &self.identifier.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_invalid_policy() {
        assert_eq!(
            RateLimitPolicy::new("api", Duration::ZERO, 10).unwrap_err(),
            PolicyError::ZeroWindow
        );
        assert_eq!(
            RateLimitPolicy::new("api", Duration::from_secs(1), 0).unwrap_err(),
            PolicyError::ZeroMax
        );
    }

    #[test]
    fn test_identifier_fallback_chain() {
        let policy = RateLimitPolicy::new("api", Duration::from_secs(60), 5).unwrap();
        let meta = RequestMeta::new(Some("1.2.3.4".into()), "/", "GET");
        assert_eq!(policy.identifier_for(&meta), "1.2.3.4");
        assert_eq!(policy.identifier_for(&RequestMeta::default()), "unknown");

        let policy = policy.with_identifier(|meta| meta.user_id.clone());
        let meta = meta.with_user_id("user-7");
        assert_eq!(policy.identifier_for(&meta), "user-7");
        assert_eq!(policy.key_for("user-7"), "rl:api:user-7");
    }

    #[test]
    fn test_rejection_message_body() {
        let text = RejectionMessage::from("slow down");
        assert_eq!(text.to_body(), json!({ "error": "slow down" }));

        let custom = RejectionMessage::Json(json!({ "code": 42, "message": "nope" }));
        assert_eq!(custom.to_body(), json!({ "code": 42, "message": "nope" }));
        assert_eq!(custom.summary(), "nope");
    }

    #[test]
    fn test_failure_mode_parse() {
        assert_eq!("Closed".parse::<FailureMode>().unwrap(), FailureMode::Closed);
        assert!("sideways".parse::<FailureMode>().is_err());
    }
}

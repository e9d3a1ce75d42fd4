//! Named policies for common endpoint classes.
//!
//! Call sites pick a [`Preset`] instead of hardcoding numbers; tuning
//! happens here.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::{FailureMode, RateLimitPolicy, RejectionMessage};
use crate::error::PolicyError;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Endpoint classes with tuned defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Api,
    Auth,
    Signup,
    PasswordReset,
    Financial,
    Admin,
    Graphql,
    Websocket,
}

impl Preset {
    pub const ALL: [Preset; 8] = [
        Preset::Api,
        Preset::Auth,
        Preset::Signup,
        Preset::PasswordReset,
        Preset::Financial,
        Preset::Admin,
        Preset::Graphql,
        Preset::Websocket,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Preset::Api => "api",
            Preset::Auth => "auth",
            Preset::Signup => "signup",
            Preset::PasswordReset => "password-reset",
            Preset::Financial => "financial",
            Preset::Admin => "admin",
            Preset::Graphql => "graphql",
            Preset::Websocket => "websocket",
        }
    }

    pub fn window(self) -> Duration {
        match self {
            Preset::Api | Preset::Auth | Preset::Admin => 15 * MINUTE,
            Preset::Signup | Preset::PasswordReset | Preset::Financial => HOUR,
            Preset::Graphql | Preset::Websocket => MINUTE,
        }
    }

    pub fn max(self) -> u32 {
        match self {
            Preset::Api => 100,
            Preset::Auth => 5,
            Preset::Signup | Preset::PasswordReset => 3,
            Preset::Financial => 10,
            Preset::Admin => 50,
            Preset::Graphql => 60,
            Preset::Websocket => 10,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Preset::Api => "Too many requests, please try again later.",
            Preset::Auth => "Too many authentication attempts, please try again later.",
            Preset::Signup => "Too many accounts created from this IP, please try again later.",
            Preset::PasswordReset => "Too many password reset attempts, please try again later.",
            Preset::Financial => "Too many financial operations, please try again later.",
            Preset::Admin => "Too many admin requests, please try again later.",
            Preset::Graphql => "Too many GraphQL requests, please try again later.",
            Preset::Websocket => "Too many WebSocket connections, please try again later.",
        }
    }

    /// The preset's default policy.
    pub fn policy(self) -> RateLimitPolicy {
        self.policy_with(PolicyOverrides::default())
            .expect("preset defaults are valid")
    }

    /// The preset's policy with `overrides` merged over the defaults.
    pub fn policy_with(self, overrides: PolicyOverrides) -> Result<RateLimitPolicy, PolicyError> {
        let policy = RateLimitPolicy::new(
            self.name(),
            overrides.window.unwrap_or(self.window()),
            overrides.max.unwrap_or(self.max()),
        )?
        .with_message(
            overrides
                .message
                .unwrap_or_else(|| RejectionMessage::from(self.message())),
        );

        let policy = match overrides.key_prefix {
            Some(prefix) => policy.with_key_prefix(prefix),
            None => policy,
        };
        let policy = match overrides.status_code {
            Some(code) => policy.with_status_code(code),
            None => policy,
        };
        Ok(match overrides.failure_mode {
            Some(mode) => policy.with_failure_mode(mode),
            None => policy,
        })
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| PolicyError::UnknownPreset(s.to_string()))
    }
}

/// Values merged over a preset's defaults.
#[derive(Debug, Clone, Default)]
pub struct PolicyOverrides {
    pub window: Option<Duration>,
    pub max: Option<u32>,
    pub key_prefix: Option<String>,
    pub message: Option<RejectionMessage>,
    pub status_code: Option<u16>,
    pub failure_mode: Option<FailureMode>,
}

/// Build a policy from a preset name. Unknown names are a setup error.
pub fn create_from_preset(
    name: &str,
    overrides: PolicyOverrides,
) -> Result<RateLimitPolicy, PolicyError> {
    name.parse::<Preset>()?.policy_with(overrides)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_preset_has_valid_defaults() {
        for preset in Preset::ALL {
            let policy = preset.policy();
            assert_eq!(policy.name(), preset.name());
            assert!(policy.max() >= 1);
            assert_eq!(policy.key_prefix(), format!("rl:{}:", preset.name()));
            assert_eq!(policy.failure_mode(), FailureMode::Open);
        }
    }

    #[test]
    fn test_parse_accepts_snake_case() {
        assert_eq!("password_reset".parse::<Preset>().unwrap(), Preset::PasswordReset);
        assert_eq!("Financial".parse::<Preset>().unwrap(), Preset::Financial);
    }

    #[test]
    fn test_unknown_preset_is_error() {
        let err = create_from_preset("booking", PolicyOverrides::default()).unwrap_err();
        assert_eq!(err, PolicyError::UnknownPreset("booking".to_string()));
    }

    #[test]
    fn test_overrides_merge_over_defaults() {
        let policy = create_from_preset(
            "auth",
            PolicyOverrides {
                max: Some(20),
                failure_mode: Some(FailureMode::Closed),
                status_code: Some(503),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(policy.max(), 20);
        assert_eq!(policy.window(), 15 * MINUTE);
        assert_eq!(policy.status_code(), 503);
        assert_eq!(policy.failure_mode(), FailureMode::Closed);
        assert_eq!(
            policy.message().summary(),
            "Too many authentication attempts, please try again later."
        );
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let err = create_from_preset(
            "api",
            PolicyOverrides {
                max: Some(0),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err, PolicyError::ZeroMax);
    }
}

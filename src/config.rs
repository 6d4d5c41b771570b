//! Process configuration for expected-failure adapters.
//!
//! Environment variables:
//! - `XFAIL_BYPASS=1` - Adapters created through [`xfail`](crate::xfail()) stop
//!   intercepting failures
//!
//! When XFAIL_BYPASS is enabled:
//! - Failures reach the wrapped test context unchanged
//! - No completion check is registered, so a passing test stays passed
//! - The reason is still required

use std::sync::OnceLock;

/// Global configuration loaded once at first use.
static CONFIG: OnceLock<XFailConfig> = OnceLock::new();

/// Adapter configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XFailConfig {
    /// Forward failures to the wrapped context instead of absorbing them.
    pub bypass: bool,
}

impl XFailConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            bypass: parse_flag(std::env::var("XFAIL_BYPASS").ok()),
        }
    }

    /// Creates a configuration with bypass enabled.
    pub fn bypassed() -> Self {
        Self { bypass: true }
    }
}

/// Gets the global configuration.
///
/// This is initialized once from environment variables.
pub fn get_config() -> &'static XFailConfig {
    CONFIG.get_or_init(XFailConfig::from_env)
}

/// Interprets an environment flag: `1` or `true` (any case) enable it.
fn parse_flag(value: Option<String>) -> bool {
    value
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_intercepts() {
        assert!(!XFailConfig::default().bypass);
    }

    #[test]
    fn flag_values() {
        assert!(parse_flag(Some("1".to_string())));
        assert!(parse_flag(Some("true".to_string())));
        assert!(parse_flag(Some("TRUE".to_string())));
        assert!(!parse_flag(Some("0".to_string())));
        assert!(!parse_flag(Some("yes".to_string())));
        assert!(!parse_flag(None));
    }

    #[test]
    fn from_env_matches_variable() {
        let expected = parse_flag(std::env::var("XFAIL_BYPASS").ok());
        assert_eq!(XFailConfig::from_env().bypass, expected);
        assert_eq!(get_config().bypass, expected);
    }

    #[test]
    fn bypassed_config() {
        assert!(XFailConfig::bypassed().bypass);
    }
}

// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the form gatekeeper.
//!
//! Everything is read once at startup from the environment. The two
//! required values (`VERIFICATION_SECRET`, `UPSTREAM_ID`) are kept optional
//! here: their absence is reported per request as a server misconfiguration
//! rather than preventing the service from starting.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Longest window or retention accepted, in seconds (about a century).
pub const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Configuration for the form gatekeeper service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Request intake configuration
    #[serde(default)]
    pub intake: IntakeConfig,

    /// CAPTCHA verification configuration
    #[serde(default)]
    pub verification: VerificationConfig,

    /// Per-origin quota configuration
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Upstream relay configuration
    #[serde(default)]
    pub relay: RelayConfig,

    /// Notification webhook configuration
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// CORS allow-list; empty disables the CORS layer
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Field and header names used when reading a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeConfig {
    /// Decoy field that humans never fill in (default: `_hp`)
    #[serde(default = "default_honeypot_field")]
    pub honeypot_field: String,

    /// Field carrying the CAPTCHA response token (default: `h-captcha-response`)
    #[serde(default = "default_token_field")]
    pub token_field: String,

    /// Header set by the edge proxy with the caller's address
    /// (default: `CF-Connecting-IP`)
    #[serde(default = "default_client_ip_header")]
    pub client_ip_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    /// Site-verify endpoint of the CAPTCHA provider
    #[serde(default = "default_verification_url")]
    pub endpoint: String,

    /// Shared secret; `None` means the deployment is misconfigured
    #[serde(default, skip_serializing)]
    pub secret: Option<String>,

    #[serde(default = "default_verification_timeout_ms")]
    pub timeout_ms: u64,
}

/// Sliding-window quota configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Accepted submissions per origin per window (default: 5)
    #[serde(default = "default_quota_limit")]
    pub limit: u32,

    /// Window length in seconds (default: 3600)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Store retention in seconds; defaults to twice the window
    #[serde(default)]
    pub retention_secs: Option<u64>,

    /// Prefix for store keys (default: `rl:`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// `memory`, a `redis://` URL, or `None` for no store
    #[serde(default)]
    pub store_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Base URL the upstream form id is appended to
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,

    /// Upstream form id; `None` means the deployment is misconfigured
    #[serde(default)]
    pub upstream_id: Option<String>,

    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Notification target; `None` skips the notifier entirely
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_honeypot_field() -> String {
    "_hp".to_string()
}

fn default_token_field() -> String {
    "h-captcha-response".to_string()
}

fn default_client_ip_header() -> String {
    "CF-Connecting-IP".to_string()
}

fn default_verification_url() -> String {
    "https://hcaptcha.com/siteverify".to_string()
}

fn default_verification_timeout_ms() -> u64 {
    10_000
}

fn default_quota_limit() -> u32 {
    5
}

fn default_window_secs() -> u64 {
    60 * 60
}

fn default_key_prefix() -> String {
    "rl:".to_string()
}

fn default_upstream_base_url() -> String {
    "https://formspree.io/f".to_string()
}

fn default_upstream_timeout_ms() -> u64 {
    10_000
}

fn default_webhook_timeout_ms() -> u64 {
    5_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            intake: IntakeConfig::default(),
            verification: VerificationConfig::default(),
            quota: QuotaConfig::default(),
            relay: RelayConfig::default(),
            webhook: WebhookConfig::default(),
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            honeypot_field: default_honeypot_field(),
            token_field: default_token_field(),
            client_ip_header: default_client_ip_header(),
        }
    }
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            endpoint: default_verification_url(),
            secret: None,
            timeout_ms: default_verification_timeout_ms(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            limit: default_quota_limit(),
            window_secs: default_window_secs(),
            retention_secs: None,
            key_prefix: default_key_prefix(),
            store_url: None,
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            upstream_id: None,
            timeout_ms: default_upstream_timeout_ms(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl QuotaConfig {
    /// Get the sliding window duration, capped at [`MAX_DURATION_SECS`]
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs.min(MAX_DURATION_SECS))
    }

    /// Get the store retention; twice the window unless set explicitly.
    pub fn retention(&self) -> Duration {
        match self.retention_secs {
            Some(secs) => Duration::from_secs(secs.min(MAX_DURATION_SECS)),
            None => self.window().saturating_mul(2),
        }
    }
}

impl VerificationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RelayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset, and unparseable numbers fall back
    /// to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let defaults = Config::default();

        Config {
            bind_addr: var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            intake: IntakeConfig {
                honeypot_field: var("HONEYPOT_FIELD").unwrap_or(defaults.intake.honeypot_field),
                token_field: var("TOKEN_FIELD").unwrap_or(defaults.intake.token_field),
                client_ip_header: var("CLIENT_IP_HEADER")
                    .unwrap_or(defaults.intake.client_ip_header),
            },
            verification: VerificationConfig {
                endpoint: var("VERIFICATION_URL").unwrap_or(defaults.verification.endpoint),
                secret: var("VERIFICATION_SECRET"),
                timeout_ms: var("VERIFICATION_TIMEOUT_MS")
                    .and_then(parse_trimmed)
                    .unwrap_or(defaults.verification.timeout_ms),
            },
            quota: QuotaConfig {
                limit: var("QUOTA_LIMIT")
                    .and_then(parse_trimmed)
                    .unwrap_or(defaults.quota.limit),
                window_secs: var("QUOTA_WINDOW_SECS")
                    .and_then(parse_duration_secs)
                    .unwrap_or(defaults.quota.window_secs),
                retention_secs: var("QUOTA_RETENTION_SECS").and_then(parse_duration_secs),
                key_prefix: var("QUOTA_KEY_PREFIX").unwrap_or(defaults.quota.key_prefix),
                store_url: var("QUOTA_STORE_URL"),
            },
            relay: RelayConfig {
                base_url: var("UPSTREAM_BASE_URL").unwrap_or(defaults.relay.base_url),
                upstream_id: var("UPSTREAM_ID"),
                timeout_ms: var("UPSTREAM_TIMEOUT_MS")
                    .and_then(parse_trimmed)
                    .unwrap_or(defaults.relay.timeout_ms),
            },
            webhook: WebhookConfig {
                url: var("WEBHOOK_URL"),
                timeout_ms: var("WEBHOOK_TIMEOUT_MS")
                    .and_then(parse_trimmed)
                    .unwrap_or(defaults.webhook.timeout_ms),
            },
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn parse_trimmed<T: FromStr>(value: String) -> Option<T> {
    value.trim().parse().ok()
}

fn parse_duration_secs(value: String) -> Option<u64> {
    parse_trimmed::<u64>(value).filter(|secs| (1..=MAX_DURATION_SECS).contains(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_empty() {
        let config = Config::from_lookup(lookup_from(&[]));

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.intake.honeypot_field, "_hp");
        assert_eq!(config.intake.token_field, "h-captcha-response");
        assert_eq!(config.quota.limit, 5);
        assert_eq!(config.quota.window(), Duration::from_secs(3600));
        assert!(config.verification.secret.is_none());
        assert!(config.relay.upstream_id.is_none());
        assert!(config.webhook.url.is_none());
        assert!(config.quota.store_url.is_none());
    }

    #[test]
    fn test_retention_defaults_to_twice_window() {
        let config = QuotaConfig {
            window_secs: 600,
            ..Default::default()
        };
        assert_eq!(config.retention(), Duration::from_secs(1200));

        let config = QuotaConfig {
            window_secs: 600,
            retention_secs: Some(900),
            ..Default::default()
        };
        assert_eq!(config.retention(), Duration::from_secs(900));
    }

    #[test]
    fn test_huge_durations_are_capped() {
        let config = QuotaConfig {
            window_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.window(), Duration::from_secs(MAX_DURATION_SECS));
        assert_eq!(config.retention(), Duration::from_secs(2 * MAX_DURATION_SECS));

        let config = QuotaConfig {
            retention_secs: Some(u64::MAX),
            ..Default::default()
        };
        assert_eq!(config.retention(), Duration::from_secs(MAX_DURATION_SECS));
    }

    #[test]
    fn test_out_of_range_durations_use_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("QUOTA_WINDOW_SECS", "18446744073709551615"),
            ("QUOTA_RETENTION_SECS", "0"),
        ]));
        assert_eq!(config.quota.window_secs, 3600);
        assert_eq!(config.quota.retention_secs, None);

        let config = Config::from_lookup(lookup_from(&[
            ("QUOTA_WINDOW_SECS", "600"),
            ("QUOTA_RETENTION_SECS", "86400"),
        ]));
        assert_eq!(config.quota.window(), Duration::from_secs(600));
        assert_eq!(config.quota.retention(), Duration::from_secs(86400));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = Config::from_lookup(lookup_from(&[
            ("VERIFICATION_SECRET", ""),
            ("UPSTREAM_ID", "   "),
            ("WEBHOOK_URL", ""),
        ]));

        assert!(config.verification.secret.is_none());
        assert!(config.relay.upstream_id.is_none());
        assert!(config.webhook.url.is_none());
    }

    #[test]
    fn test_values_read_from_environment() {
        let config = Config::from_lookup(lookup_from(&[
            ("VERIFICATION_SECRET", "S"),
            ("UPSTREAM_ID", "xyzabc"),
            ("QUOTA_LIMIT", " 3 "),
            ("QUOTA_WINDOW_SECS", "not-a-number"),
            ("ALLOWED_ORIGINS", "https://a.example, ,https://b.example"),
        ]));

        assert_eq!(config.verification.secret.as_deref(), Some("S"));
        assert_eq!(config.relay.upstream_id.as_deref(), Some("xyzabc"));
        assert_eq!(config.quota.limit, 3);
        assert_eq!(config.quota.window_secs, 3600);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }
}

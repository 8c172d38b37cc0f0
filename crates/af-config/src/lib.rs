// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-config
#![deny(unsafe_code)]
#![warn(missing_docs)]

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration loading or validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable held a value that could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    ParseError {
        /// The environment variable name.
        key: String,
        /// Human-readable parse error detail.
        reason: String,
    },

    /// Semantic validation failed (one or more problems).
    #[error("config validation failed: {reasons:?}")]
    ValidationError {
        /// Individual validation failure messages.
        reasons: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// Advisory-level issues that do not prevent operation but deserve attention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A timeout is unusually large.
    LargeTimeout {
        /// The option concerned.
        option: String,
        /// Timeout value in seconds.
        secs: u64,
    },
    /// TLS is not configured; the listener will serve plaintext.
    PlaintextListener,
    /// No shared cache URL; rate-limit counters stay per-process.
    MissingCacheUrl,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigWarning::LargeTimeout { option, secs } => {
                write!(f, "'{option}' has a large timeout ({secs}s)")
            }
            ConfigWarning::PlaintextListener => {
                write!(f, "no TLS material configured; serving plaintext")
            }
            ConfigWarning::MissingCacheUrl => {
                write!(
                    f,
                    "AF_CACHE_URL is unset; rate limits will not be shared across replicas"
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Listener port.
    pub port: u16,
    /// Read timeout for request bodies.
    pub read_timeout: Duration,
    /// Write timeout for responses.
    pub write_timeout: Duration,
    /// Idle keep-alive timeout.
    pub idle_timeout: Duration,
    /// Maximum accepted header bytes.
    pub max_header_bytes: usize,
    /// TLS certificate path, when serving TLS.
    pub tls_cert: Option<PathBuf>,
    /// TLS key path, when serving TLS.
    pub tls_key: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
            max_header_bytes: 1 << 20,
            tls_cert: None,
            tls_key: None,
        }
    }
}

/// Token-service settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC signing secret. Must be at least 32 bytes.
    pub jwt_secret: String,
    /// Lifetime of issued tokens.
    pub token_expiry: Duration,
    /// Whether federated (OIDC) validation is attempted first.
    pub oidc_enabled: bool,
    /// Issuer URL for the federated provider.
    pub oidc_issuer: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_expiry: Duration::from_secs(3600),
            oidc_enabled: false,
            oidc_issuer: None,
        }
    }
}

/// Which rate-limiting algorithm the admission pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    /// Sliding-window counters (default).
    #[default]
    SlidingWindow,
    /// Token bucket, for bursty surfaces.
    TokenBucket,
}

/// Behavior when the shared rate-limit cache is unreachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DegradationPolicy {
    /// Fail open for reads, closed for mutations (default).
    #[default]
    ReadOpenWriteClosed,
    /// Fail open for everything.
    AlwaysOpen,
    /// Fail closed for everything.
    AlwaysClosed,
}

/// Rate-limiter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Selected algorithm.
    pub algorithm: RateLimitAlgorithm,
    /// Window length for sliding-window counting.
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Bucket capacity for token-bucket mode.
    pub burst_size: u32,
    /// Shared cache URL (unset ⇒ per-process counters only).
    pub cache_url: Option<String>,
    /// Degradation policy when the cache is unreachable.
    pub degradation: DegradationPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            algorithm: RateLimitAlgorithm::SlidingWindow,
            window: Duration::from_secs(60),
            max_requests: 1000,
            burst_size: 100,
            cache_url: None,
            degradation: DegradationPolicy::ReadOpenWriteClosed,
        }
    }
}

/// Secrets-provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// Path of the JSON secrets file (file backend). Unset ⇒ env backend.
    pub file: Option<PathBuf>,
    /// Prefix for the process-environment backend.
    pub env_prefix: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: "AF_SECRET_".to_string(),
        }
    }
}

/// In-process memory/cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Whether the in-process memory layer is enabled.
    pub enabled: bool,
    /// Implementation selector.
    pub implementation: String,
    /// Maximum cached entries.
    pub max_entries: usize,
    /// Verbose cache logging.
    pub debug: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            implementation: "lru".to_string(),
            max_entries: 10_000,
            debug: false,
        }
    }
}

/// Top-level immutable configuration snapshot for the control plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// HTTP listener settings.
    pub api: ApiConfig,
    /// Token-service settings.
    pub auth: AuthConfig,
    /// Rate-limiter settings.
    pub rate_limit: RateLimitConfig,
    /// Secrets-provider settings.
    pub secrets: SecretsConfig,
    /// In-process memory settings.
    pub memory: MemoryConfig,
    /// Relational database URL.
    pub database_url: Option<String>,
    /// Message broker URL.
    pub bus_url: Option<String>,
    /// Whether response/log redaction is active.
    pub data_minimization_enabled: bool,
    /// Whether publish-side residency enforcement is strict.
    pub residency_strict: bool,
    /// Lifetime of cost estimates.
    pub estimate_ttl: Duration,
}

impl Eq for ControlConfig {}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            secrets: SecretsConfig::default(),
            memory: MemoryConfig::default(),
            database_url: None,
            bus_url: None,
            data_minimization_enabled: false,
            residency_strict: false,
            estimate_ttl: Duration::from_secs(60),
        }
    }
}

impl ControlConfig {
    /// Load the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for unparseable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load the configuration through an injectable lookup (for tests).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ParseError`] for unparseable values.
    pub fn load_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(v) = lookup("AF_API_PORT") {
            cfg.api.port = parse_num(&v, "AF_API_PORT")?;
        }
        if let Some(v) = lookup("AF_API_READ_TIMEOUT") {
            cfg.api.read_timeout = parse_duration(&v, "AF_API_READ_TIMEOUT")?;
        }
        if let Some(v) = lookup("AF_API_WRITE_TIMEOUT") {
            cfg.api.write_timeout = parse_duration(&v, "AF_API_WRITE_TIMEOUT")?;
        }
        if let Some(v) = lookup("AF_API_IDLE_TIMEOUT") {
            cfg.api.idle_timeout = parse_duration(&v, "AF_API_IDLE_TIMEOUT")?;
        }
        if let Some(v) = lookup("AF_API_MAX_HEADER_BYTES") {
            cfg.api.max_header_bytes = parse_num(&v, "AF_API_MAX_HEADER_BYTES")?;
        }
        cfg.api.tls_cert = lookup("AF_API_TLS_CERT").map(PathBuf::from);
        cfg.api.tls_key = lookup("AF_API_TLS_KEY").map(PathBuf::from);

        if let Some(v) = lookup("AF_JWT_SECRET") {
            cfg.auth.jwt_secret = v;
        }
        if let Some(v) = lookup("AF_TOKEN_EXPIRY") {
            cfg.auth.token_expiry = parse_duration(&v, "AF_TOKEN_EXPIRY")?;
        }
        if let Some(v) = lookup("AF_OIDC_ENABLED") {
            cfg.auth.oidc_enabled = parse_bool(&v, "AF_OIDC_ENABLED")?;
        }
        cfg.auth.oidc_issuer = lookup("AF_OIDC_ISSUER");

        if let Some(v) = lookup("AF_RATE_LIMIT_ALGORITHM") {
            cfg.rate_limit.algorithm = match v.as_str() {
                "sliding_window" => RateLimitAlgorithm::SlidingWindow,
                "token_bucket" => RateLimitAlgorithm::TokenBucket,
                other => {
                    return Err(ConfigError::ParseError {
                        key: "AF_RATE_LIMIT_ALGORITHM".into(),
                        reason: format!("unknown algorithm '{other}'"),
                    });
                }
            };
        }
        if let Some(v) = lookup("AF_RATE_LIMIT_WINDOW") {
            cfg.rate_limit.window = parse_duration(&v, "AF_RATE_LIMIT_WINDOW")?;
        }
        if let Some(v) = lookup("AF_RATE_LIMIT_MAX_REQUESTS") {
            cfg.rate_limit.max_requests = parse_num(&v, "AF_RATE_LIMIT_MAX_REQUESTS")?;
        }
        if let Some(v) = lookup("AF_RATE_LIMIT_BURST_SIZE") {
            cfg.rate_limit.burst_size = parse_num(&v, "AF_RATE_LIMIT_BURST_SIZE")?;
        }
        cfg.rate_limit.cache_url = lookup("AF_CACHE_URL");

        if let Some(v) = lookup("AF_SECRETS_FILE") {
            cfg.secrets.file = Some(PathBuf::from(v));
        }

        if let Some(v) = lookup("AF_MEMORY_ENABLED") {
            cfg.memory.enabled = parse_bool(&v, "AF_MEMORY_ENABLED")?;
        }
        if let Some(v) = lookup("AF_MEMORY_IMPLEMENTATION") {
            cfg.memory.implementation = v;
        }
        if let Some(v) = lookup("AF_MEMORY_MAX_ENTRIES") {
            cfg.memory.max_entries = parse_num(&v, "AF_MEMORY_MAX_ENTRIES")?;
        }
        if let Some(v) = lookup("AF_MEMORY_DEBUG") {
            cfg.memory.debug = parse_bool(&v, "AF_MEMORY_DEBUG")?;
        }

        cfg.database_url = lookup("AF_DATABASE_URL");
        cfg.bus_url = lookup("AF_BUS_URL");

        if let Some(v) = lookup("AF_DATA_MINIMIZATION_ENABLED") {
            cfg.data_minimization_enabled = parse_bool(&v, "AF_DATA_MINIMIZATION_ENABLED")?;
        }
        if let Some(v) = lookup("AF_RESIDENCY_STRICT") {
            cfg.residency_strict = parse_bool(&v, "AF_RESIDENCY_STRICT")?;
        }
        if let Some(v) = lookup("AF_ESTIMATE_TTL") {
            cfg.estimate_ttl = parse_duration(&v, "AF_ESTIMATE_TTL")?;
        }

        Ok(cfg)
    }

    /// Semantic validation. Returns advisory warnings on success.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] aggregating every hard
    /// problem found.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        if self.auth.jwt_secret.len() < 32 {
            reasons.push(format!(
                "AF_JWT_SECRET must be at least 32 bytes (got {})",
                self.auth.jwt_secret.len()
            ));
        }
        if self.auth.oidc_enabled && self.auth.oidc_issuer.is_none() {
            reasons.push("AF_OIDC_ENABLED requires AF_OIDC_ISSUER".to_string());
        }
        if self.api.port == 0 {
            reasons.push("AF_API_PORT must be nonzero".to_string());
        }
        if self.api.tls_cert.is_some() != self.api.tls_key.is_some() {
            reasons.push("AF_API_TLS_CERT and AF_API_TLS_KEY must be set together".to_string());
        }
        if self.rate_limit.max_requests == 0 {
            reasons.push("AF_RATE_LIMIT_MAX_REQUESTS must be nonzero".to_string());
        }
        if self.rate_limit.window.is_zero() {
            reasons.push("AF_RATE_LIMIT_WINDOW must be nonzero".to_string());
        }
        if self.estimate_ttl.is_zero() {
            reasons.push("AF_ESTIMATE_TTL must be nonzero".to_string());
        }

        if !reasons.is_empty() {
            return Err(ConfigError::ValidationError { reasons });
        }

        for (option, timeout) in [
            ("AF_API_READ_TIMEOUT", self.api.read_timeout),
            ("AF_API_WRITE_TIMEOUT", self.api.write_timeout),
            ("AF_API_IDLE_TIMEOUT", self.api.idle_timeout),
        ] {
            if timeout > Duration::from_secs(300) {
                warnings.push(ConfigWarning::LargeTimeout {
                    option: option.to_string(),
                    secs: timeout.as_secs(),
                });
            }
        }
        if self.api.tls_cert.is_none() {
            warnings.push(ConfigWarning::PlaintextListener);
        }
        if self.rate_limit.cache_url.is_none() {
            warnings.push(ConfigWarning::MissingCacheUrl);
        }

        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Parse helpers
// ---------------------------------------------------------------------------

fn parse_num<T: std::str::FromStr>(v: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    v.trim().parse().map_err(|e| ConfigError::ParseError {
        key: key.to_string(),
        reason: format!("{e}"),
    })
}

fn parse_bool(v: &str, key: &str) -> Result<bool, ConfigError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::ParseError {
            key: key.to_string(),
            reason: format!("expected boolean, got '{other}'"),
        }),
    }
}

/// Parse `"30s"`, `"5m"`, `"2h"`, or a bare number of seconds.
fn parse_duration(v: &str, key: &str) -> Result<Duration, ConfigError> {
    let v = v.trim();
    let (digits, unit) = match v.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => v.split_at(idx),
        None => (v, ""),
    };
    let n: u64 = digits.parse().map_err(|_| ConfigError::ParseError {
        key: key.to_string(),
        reason: format!("expected duration, got '{v}'"),
    })?;
    let secs = match unit {
        "" | "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        other => {
            return Err(ConfigError::ParseError {
                key: key.to_string(),
                reason: format!("unknown duration unit '{other}'"),
            });
        }
    };
    Ok(Duration::from_secs(secs))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn secret() -> String {
        "s".repeat(32)
    }

    #[test]
    fn defaults_match_spec() {
        let cfg = ControlConfig::load_with(|_| None).unwrap();
        assert_eq!(cfg.api.port, 8080);
        assert_eq!(cfg.api.read_timeout, Duration::from_secs(30));
        assert_eq!(cfg.api.write_timeout, Duration::from_secs(30));
        assert_eq!(cfg.api.idle_timeout, Duration::from_secs(120));
        assert_eq!(cfg.rate_limit.max_requests, 1000);
        assert_eq!(cfg.rate_limit.window, Duration::from_secs(60));
        assert_eq!(cfg.estimate_ttl, Duration::from_secs(60));
        assert_eq!(cfg.rate_limit.algorithm, RateLimitAlgorithm::SlidingWindow);
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = ControlConfig::load_with(env(&[
            ("AF_API_PORT", "9090"),
            ("AF_API_READ_TIMEOUT", "45s"),
            ("AF_RATE_LIMIT_ALGORITHM", "token_bucket"),
            ("AF_RATE_LIMIT_MAX_REQUESTS", "50"),
            ("AF_CACHE_URL", "redis://cache:6379"),
            ("AF_DATABASE_URL", "postgres://db/af"),
            ("AF_RESIDENCY_STRICT", "true"),
        ]))
        .unwrap();
        assert_eq!(cfg.api.port, 9090);
        assert_eq!(cfg.api.read_timeout, Duration::from_secs(45));
        assert_eq!(cfg.rate_limit.algorithm, RateLimitAlgorithm::TokenBucket);
        assert_eq!(cfg.rate_limit.max_requests, 50);
        assert_eq!(cfg.rate_limit.cache_url.as_deref(), Some("redis://cache:6379"));
        assert!(cfg.residency_strict);
    }

    #[test]
    fn duration_forms() {
        let cfg = ControlConfig::load_with(env(&[("AF_TOKEN_EXPIRY", "5m")])).unwrap();
        assert_eq!(cfg.auth.token_expiry, Duration::from_secs(300));
        let cfg = ControlConfig::load_with(env(&[("AF_TOKEN_EXPIRY", "120")])).unwrap();
        assert_eq!(cfg.auth.token_expiry, Duration::from_secs(120));
        let cfg = ControlConfig::load_with(env(&[("AF_TOKEN_EXPIRY", "2h")])).unwrap();
        assert_eq!(cfg.auth.token_expiry, Duration::from_secs(7200));
    }

    #[test]
    fn bad_duration_is_a_parse_error() {
        let err = ControlConfig::load_with(env(&[("AF_TOKEN_EXPIRY", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn bad_bool_is_a_parse_error() {
        let err = ControlConfig::load_with(env(&[("AF_OIDC_ENABLED", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn unknown_algorithm_rejected() {
        let err =
            ControlConfig::load_with(env(&[("AF_RATE_LIMIT_ALGORITHM", "leaky")])).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn short_secret_fails_validation() {
        let mut cfg = ControlConfig::default();
        cfg.auth.jwt_secret = "short".into();
        let err = cfg.validate().unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("AF_JWT_SECRET")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn oidc_without_issuer_fails_validation() {
        let mut cfg = ControlConfig::default();
        cfg.auth.jwt_secret = secret();
        cfg.auth.oidc_enabled = true;
        let err = cfg.validate().unwrap_err();
        match err {
            ConfigError::ValidationError { reasons } => {
                assert!(reasons.iter().any(|r| r.contains("AF_OIDC_ISSUER")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn tls_halves_must_come_together() {
        let mut cfg = ControlConfig::default();
        cfg.auth.jwt_secret = secret();
        cfg.api.tls_cert = Some(PathBuf::from("/etc/af/cert.pem"));
        assert!(cfg.validate().is_err());
        cfg.api.tls_key = Some(PathBuf::from("/etc/af/key.pem"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn valid_config_emits_advisory_warnings() {
        let mut cfg = ControlConfig::default();
        cfg.auth.jwt_secret = secret();
        cfg.api.idle_timeout = Duration::from_secs(900);
        let warnings = cfg.validate().unwrap();
        assert!(warnings.iter().any(|w| matches!(
            w,
            ConfigWarning::LargeTimeout { option, .. } if option == "AF_API_IDLE_TIMEOUT"
        )));
        assert!(warnings.contains(&ConfigWarning::PlaintextListener));
        assert!(warnings.contains(&ConfigWarning::MissingCacheUrl));
    }

    #[test]
    fn secrets_file_selects_file_backend() {
        let cfg = ControlConfig::load_with(env(&[("AF_SECRETS_FILE", "/run/af/secrets.json")]))
            .unwrap();
        assert_eq!(
            cfg.secrets.file.as_deref(),
            Some(std::path::Path::new("/run/af/secrets.json"))
        );
        assert_eq!(cfg.secrets.env_prefix, "AF_SECRET_");
    }

    #[test]
    fn config_snapshot_serde_roundtrip() {
        let mut cfg = ControlConfig::default();
        cfg.auth.jwt_secret = secret();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ControlConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cfg);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-token
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Federated (OIDC) validation with cached discovery.
pub mod oidc;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

pub use oidc::{OidcConfig, OidcValidator};

/// Minimum accepted signing-secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

// ---------------------------------------------------------------------------
// Claims & errors
// ---------------------------------------------------------------------------

/// The claim set carried by every AgentFlow token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Owning tenant.
    pub tenant_id: String,
    /// Acting user.
    pub user_id: String,
    /// Bound role names.
    pub roles: Vec<String>,
    /// Permissions resolved at issue time.
    pub permissions: Vec<String>,
    /// Expiry (unix seconds).
    pub exp: i64,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Not-before (unix seconds).
    pub nbf: i64,
    /// Token id, rotated on refresh, keyed by revocation.
    pub jti: String,
}

/// Errors from the token service.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The signing secret is shorter than [`MIN_SECRET_BYTES`].
    #[error("signing secret must be at least {MIN_SECRET_BYTES} bytes")]
    WeakSecret,

    /// The token is past its expiry.
    #[error("token expired")]
    Expired,

    /// The token failed structural or signature validation.
    #[error("token invalid: {reason}")]
    Invalid {
        /// Safe-to-log failure detail.
        reason: String,
    },

    /// The token's id is in the revocation set.
    #[error("token revoked")]
    Revoked,

    /// The federated identity provider could not be used.
    ///
    /// Callers that have a local fallback must not surface this.
    #[error("identity provider unavailable: {reason}")]
    IdentityProviderUnavailable {
        /// Safe-to-log failure detail.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Revocation
// ---------------------------------------------------------------------------

/// Set of revoked token ids, each held until its token would have expired
/// anyway.
#[derive(Default)]
pub struct RevocationSet {
    entries: Mutex<HashMap<String, i64>>,
}

impl RevocationSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token id until `expires_at` (unix seconds).
    pub fn insert(&self, jti: &str, expires_at: i64) {
        let mut entries = self.entries.lock().expect("revocation lock poisoned");
        entries.insert(jti.to_string(), expires_at);
    }

    /// Whether `jti` is currently revoked. Expired entries are purged as a
    /// side effect.
    pub fn contains(&self, jti: &str) -> bool {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.lock().expect("revocation lock poisoned");
        entries.retain(|_, exp| *exp > now);
        entries.contains_key(jti)
    }

    /// Number of live revocations.
    pub fn len(&self) -> usize {
        let now = Utc::now().timestamp();
        let mut entries = self.entries.lock().expect("revocation lock poisoned");
        entries.retain(|_, exp| *exp > now);
        entries.len()
    }

    /// Whether the set holds no live revocations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Local service
// ---------------------------------------------------------------------------

/// Locally-signed token issue/validate/refresh/revoke.
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
    revocations: RevocationSet,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service signing with `secret` and issuing tokens valid for
    /// `expiry`.
    ///
    /// # Errors
    ///
    /// [`TokenError::WeakSecret`] for secrets under [`MIN_SECRET_BYTES`].
    pub fn new(secret: &[u8], expiry: Duration) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(TokenError::WeakSecret);
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiry,
            revocations: RevocationSet::new(),
        })
    }

    /// Issue a token for `(tenant, user)` with the given roles and resolved
    /// permissions.
    ///
    /// # Errors
    ///
    /// [`TokenError::Invalid`] if encoding fails (never in practice).
    pub fn issue(
        &self,
        tenant_id: &str,
        user_id: &str,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, TokenError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            roles,
            permissions,
            exp: now + self.expiry.as_secs() as i64,
            iat: now,
            nbf: now,
            jti: Uuid::new_v4().to_string(),
        };
        self.sign(&claims)
    }

    /// Sign a prepared claim set. Exposed for refresh; issue paths should
    /// prefer [`issue`](Self::issue).
    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(|e| {
            TokenError::Invalid {
                reason: format!("encode: {e}"),
            }
        })
    }

    /// Validate signature, expiry, not-before, and revocation; returns the
    /// claims.
    ///
    /// # Errors
    ///
    /// [`TokenError::Expired`], [`TokenError::Revoked`], or
    /// [`TokenError::Invalid`].
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = true;

        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(map_jwt_error)?;
        if self.revocations.contains(&data.claims.jti) {
            return Err(TokenError::Revoked);
        }
        Ok(data.claims)
    }

    /// Rotate the token id and extend the expiry, preserving identity.
    ///
    /// # Errors
    ///
    /// Any validation error of the presented token.
    pub fn refresh(&self, token: &str) -> Result<String, TokenError> {
        let claims = self.validate(token)?;
        let now = Utc::now().timestamp();
        let refreshed = Claims {
            exp: now + self.expiry.as_secs() as i64,
            iat: now,
            nbf: now,
            jti: Uuid::new_v4().to_string(),
            ..claims
        };
        self.sign(&refreshed)
    }

    /// Revoke a live token. The revocation is held for the token's
    /// remaining lifetime.
    ///
    /// # Errors
    ///
    /// Any validation error of the presented token.
    pub fn revoke(&self, token: &str) -> Result<(), TokenError> {
        let claims = self.validate(token)?;
        self.revocations.insert(&claims.jti, claims.exp);
        tracing::info!(tenant_id = %claims.tenant_id, user_id = %claims.user_id, "token revoked");
        Ok(())
    }

    /// The revocation set (shared with the federated path).
    #[must_use]
    pub fn revocations(&self) -> &RevocationSet {
        &self.revocations
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match e.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        kind => TokenError::Invalid {
            reason: format!("{kind:?}"),
        },
    }
}

// ---------------------------------------------------------------------------
// AuthService: federated-first with observable fallback
// ---------------------------------------------------------------------------

/// The authenticator the admission pipeline calls.
///
/// With federated identity configured, validation tries the external
/// provider first and falls back to local validation on *any* failure. The
/// fallback is observable (log tag + counter) but never user-visible.
pub struct AuthService {
    local: TokenService,
    oidc: Option<OidcValidator>,
    fallbacks: AtomicU64,
}

impl AuthService {
    /// Local-only authentication.
    #[must_use]
    pub fn local(local: TokenService) -> Self {
        Self {
            local,
            oidc: None,
            fallbacks: AtomicU64::new(0),
        }
    }

    /// Federated-first authentication.
    #[must_use]
    pub fn federated(local: TokenService, oidc: OidcValidator) -> Self {
        Self {
            local,
            oidc: Some(oidc),
            fallbacks: AtomicU64::new(0),
        }
    }

    /// The local service (issue/refresh/revoke always go through it).
    #[must_use]
    pub fn local_service(&self) -> &TokenService {
        &self.local
    }

    /// How many times validation fell back to the local path.
    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }

    /// Validate a token, federated-first when configured.
    ///
    /// # Errors
    ///
    /// Local validation errors only; provider unavailability is absorbed by
    /// the fallback.
    pub async fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        if let Some(oidc) = &self.oidc {
            match oidc.validate(token).await {
                Ok(claims) => {
                    if self.local.revocations().contains(&claims.jti) {
                        return Err(TokenError::Revoked);
                    }
                    return Ok(claims);
                }
                Err(e) => {
                    self.fallbacks.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(oidc_fallback = true, error = %e, "federated validation failed; using local");
                }
            }
        }
        self.local.validate(token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

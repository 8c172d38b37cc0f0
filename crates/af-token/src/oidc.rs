// SPDX-License-Identifier: MIT OR Apache-2.0
//! Federated (OIDC) validation.
//!
//! The discovery document and key set are fetched lazily and cached for a
//! configurable interval. Every failure along this path maps to
//! [`TokenError::IdentityProviderUnavailable`] so the caller can fall back
//! to local validation without inspecting causes.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::{Claims, TokenError};

/// Settings for the federated path.
#[derive(Debug, Clone)]
pub struct OidcConfig {
    /// Issuer base URL (no trailing slash).
    pub issuer: String,
    /// How long the discovery document and keys are cached.
    pub refresh_interval: Duration,
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    issuer: String,
    jwks_uri: String,
}

struct CachedKeys {
    issuer: String,
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Validates tokens against an external identity provider.
pub struct OidcValidator {
    config: OidcConfig,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl OidcValidator {
    /// Create a validator for the configured issuer.
    #[must_use]
    pub fn new(config: OidcConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cache: RwLock::new(None),
        }
    }

    /// Validate a token against the provider's published keys.
    ///
    /// # Errors
    ///
    /// [`TokenError::IdentityProviderUnavailable`] for every failure on
    /// this path (fetch, key lookup, signature, claims); the caller falls
    /// back to local validation.
    pub async fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let header = decode_header(token).map_err(|e| unavailable(format!("header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| unavailable("token has no key id".to_string()))?;

        let (issuer, jwks) = self.keys().await?;
        let jwk = jwks
            .find(&kid)
            .ok_or_else(|| unavailable(format!("no key '{kid}' in provider key set")))?;
        let decoding =
            DecodingKey::from_jwk(jwk).map_err(|e| unavailable(format!("key material: {e}")))?;

        let algorithm = header.alg;
        if !matches!(algorithm, Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512) {
            return Err(unavailable(format!(
                "provider token uses unsupported algorithm {algorithm:?}"
            )));
        }

        let mut validation = Validation::new(algorithm);
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);

        decode::<Claims>(token, &decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| unavailable(format!("federated validation: {e}")))
    }

    async fn keys(&self) -> Result<(String, JwkSet), TokenError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.config.refresh_interval {
                    return Ok((cached.issuer.clone(), cached.jwks.clone()));
                }
            }
        }

        let discovery_url = format!(
            "{}/.well-known/openid-configuration",
            self.config.issuer.trim_end_matches('/')
        );
        let discovery: DiscoveryDocument = self
            .http
            .get(&discovery_url)
            .send()
            .await
            .map_err(|e| unavailable(format!("discovery fetch: {e}")))?
            .error_for_status()
            .map_err(|e| unavailable(format!("discovery status: {e}")))?
            .json()
            .await
            .map_err(|e| unavailable(format!("discovery parse: {e}")))?;

        let jwks: JwkSet = self
            .http
            .get(&discovery.jwks_uri)
            .send()
            .await
            .map_err(|e| unavailable(format!("jwks fetch: {e}")))?
            .error_for_status()
            .map_err(|e| unavailable(format!("jwks status: {e}")))?
            .json()
            .await
            .map_err(|e| unavailable(format!("jwks parse: {e}")))?;

        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            issuer: discovery.issuer.clone(),
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        tracing::debug!(issuer = %discovery.issuer, keys = jwks.keys.len(), "oidc key set refreshed");
        Ok((discovery.issuer, jwks))
    }
}

fn unavailable(reason: String) -> TokenError {
    TokenError::IdentityProviderUnavailable { reason }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared daemon state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use af_audit::{AuditLogger, MemoryAuditStore};
use af_bus::{BusAdapter, MemoryBroker};
use af_config::ControlConfig;
use af_cost::{BudgetTracker, CostEstimator, PriceTable};
use af_ratelimit::{LimiterSettings, MemoryCache, RateLimiter};
use af_rbac::{RbacEngine, StaticRoleSource};
use af_store::MemoryDatabase;
use af_tenancy::ScopedDb;
use af_token::{AuthService, OidcConfig, OidcValidator, TokenService};

use crate::middleware::default_redaction_rules;

/// Everything the handlers and pipeline stages share.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration snapshot.
    pub config: Arc<ControlConfig>,
    /// The authenticator (federated-first when configured).
    pub auth: Arc<AuthService>,
    /// Role/permission engine.
    pub rbac: Arc<RbacEngine>,
    /// Distributed rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// Audit chain writer.
    pub audit: AuditLogger,
    /// Tenant-mediated data access.
    pub db: ScopedDb,
    /// Message bus adapter.
    pub bus: BusAdapter,
    /// Plan cost estimator.
    pub estimator: Arc<CostEstimator>,
    /// Budget ledger.
    pub budgets: Arc<BudgetTracker>,
    /// Compiled redaction rules.
    pub redaction: Arc<Vec<(regex::Regex, String)>>,
    /// Process start, for health uptime.
    pub started_at: Instant,
}

/// The in-memory reference implementations behind an [`AppState`], kept so
/// tests (and the CLI's validate path) can reach past the seams.
pub struct InMemoryParts {
    /// The database under the mediator.
    pub db: Arc<MemoryDatabase>,
    /// The audit store under the logger.
    pub audit_store: Arc<MemoryAuditStore>,
    /// The broker under the bus adapter.
    pub broker: Arc<MemoryBroker>,
    /// The role source under the RBAC engine.
    pub roles: Arc<StaticRoleSource>,
}

impl AppState {
    /// Build a state over in-memory reference implementations of every
    /// external collaborator. The production wiring replaces these with
    /// real drivers behind the same traits.
    ///
    /// # Errors
    ///
    /// Fails when the configured signing secret is too weak.
    pub fn in_memory(config: ControlConfig) -> anyhow::Result<(Self, InMemoryParts)> {
        let token_service =
            TokenService::new(config.auth.jwt_secret.as_bytes(), config.auth.token_expiry)?;
        let auth = if config.auth.oidc_enabled {
            let issuer = config
                .auth
                .oidc_issuer
                .clone()
                .unwrap_or_default();
            AuthService::federated(
                token_service,
                OidcValidator::new(OidcConfig {
                    issuer,
                    refresh_interval: Duration::from_secs(300),
                }),
            )
        } else {
            AuthService::local(token_service)
        };

        let roles = Arc::new(StaticRoleSource::new());
        let rbac = RbacEngine::new(roles.clone(), Duration::from_secs(30));

        let limiter = RateLimiter::new(
            Arc::new(MemoryCache::new()),
            LimiterSettings::from(&config.rate_limit),
        );

        let db = Arc::new(MemoryDatabase::new());
        let audit_store = Arc::new(MemoryAuditStore::new());
        let broker = Arc::new(MemoryBroker::new());

        let state = Self {
            auth: Arc::new(auth),
            rbac: Arc::new(rbac),
            limiter: Arc::new(limiter),
            audit: AuditLogger::new(audit_store.clone()),
            db: ScopedDb::new(db.clone()),
            bus: BusAdapter::new(broker.clone()).with_strict_residency(config.residency_strict),
            estimator: Arc::new(CostEstimator::new(
                PriceTable::with_defaults(),
                config.estimate_ttl,
            )),
            budgets: Arc::new(BudgetTracker::new()),
            redaction: Arc::new(default_redaction_rules()),
            started_at: Instant::now(),
            config: Arc::new(config),
        };
        Ok((
            state,
            InMemoryParts {
                db,
                audit_store,
                broker,
                roles,
            },
        ))
    }
}

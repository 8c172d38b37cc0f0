// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-rbac
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

/// Returns `true` when `permission` grants `resource:action`.
///
/// A permission matches as the exact pair, as `resource:*`, or as the
/// all-access `*:*`.
///
/// # Examples
///
/// ```
/// use af_rbac::permission_matches;
///
/// assert!(permission_matches("workflows:write", "workflows", "write"));
/// assert!(permission_matches("workflows:*", "workflows", "delete"));
/// assert!(permission_matches("*:*", "anything", "at-all"));
/// assert!(!permission_matches("workflows:read", "workflows", "write"));
/// ```
#[must_use]
pub fn permission_matches(permission: &str, resource: &str, action: &str) -> bool {
    let Some((res, act)) = permission.split_once(':') else {
        return false;
    };
    (res == "*" && act == "*")
        || (res == resource && (act == "*" || act == action))
}

/// Returns `true` when any permission in the set grants `resource:action`.
#[must_use]
pub fn any_permission_matches<'a, I>(permissions: I, resource: &str, action: &str) -> bool
where
    I: IntoIterator<Item = &'a String>,
{
    permissions
        .into_iter()
        .any(|p| permission_matches(p, resource, action))
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// A named permission set. Built-in roles have no tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role name, unique within its tenant (or globally for built-ins).
    pub name: String,
    /// Permission strings of the form `resource:action`.
    pub permissions: BTreeSet<String>,
    /// Owning tenant; `None` for built-in roles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Role {
    /// Create a role from a permission list.
    pub fn new<I, S>(name: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: permissions.into_iter().map(Into::into).collect(),
            tenant_id: None,
        }
    }
}

/// The resources built-in roles cover.
const BUILTIN_RESOURCES: &[&str] = &["workflows", "agents", "tools", "budgets"];

/// The fixed built-in roles: admin, developer, viewer.
#[must_use]
pub fn builtin_roles() -> Vec<Role> {
    let mut developer = Vec::new();
    let mut viewer = Vec::new();
    for resource in BUILTIN_RESOURCES {
        developer.push(format!("{resource}:read"));
        developer.push(format!("{resource}:write"));
        viewer.push(format!("{resource}:read"));
    }
    vec![
        Role::new("admin", ["*:*"]),
        Role::new("developer", developer),
        Role::new("viewer", viewer),
    ]
}

// ---------------------------------------------------------------------------
// Role source & engine
// ---------------------------------------------------------------------------

/// Errors from the RBAC engine.
#[derive(Debug, thiserror::Error)]
pub enum RbacError {
    /// The caller lacks the required permission.
    #[error("missing permission {required}")]
    InsufficientPermissions {
        /// The `resource:action` the route requires.
        required: String,
        /// The caller's effective permission set, for diagnostics.
        effective: Vec<String>,
    },

    /// Custom roles could not be loaded.
    #[error("role source unavailable: {reason}")]
    SourceUnavailable {
        /// Human-readable failure detail.
        reason: String,
    },
}

/// Supplies per-tenant custom role definitions.
#[async_trait]
pub trait RoleSource: Send + Sync {
    /// Load all custom roles of a tenant.
    async fn load_roles(&self, tenant_id: &str) -> Result<Vec<Role>, RbacError>;
}

/// A fixed in-memory role source (tests and single-process deployments).
#[derive(Default)]
pub struct StaticRoleSource {
    roles: RwLock<HashMap<String, Vec<Role>>>,
}

impl StaticRoleSource {
    /// Create an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a tenant's custom roles.
    pub async fn put(&self, tenant_id: &str, roles: Vec<Role>) {
        self.roles
            .write()
            .await
            .insert(tenant_id.to_string(), roles);
    }
}

#[async_trait]
impl RoleSource for StaticRoleSource {
    async fn load_roles(&self, tenant_id: &str) -> Result<Vec<Role>, RbacError> {
        Ok(self
            .roles
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .unwrap_or_default())
    }
}

struct CachedRoles {
    by_name: HashMap<String, Role>,
    fetched_at: Instant,
}

/// Resolves role names to effective permissions and answers permission
/// checks.
///
/// Role definitions refresh from the source at most once per TTL; a
/// single-flight guard keeps concurrent refreshes from stampeding the
/// source. [`invalidate`](Self::invalidate) forces the next check to
/// reload.
pub struct RbacEngine {
    source: Arc<dyn RoleSource>,
    ttl: Duration,
    builtins: HashMap<String, Role>,
    cache: RwLock<HashMap<String, CachedRoles>>,
    reload: Mutex<()>,
}

impl RbacEngine {
    /// Create an engine over `source`, refreshing at most every `ttl`.
    pub fn new(source: Arc<dyn RoleSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            builtins: builtin_roles()
                .into_iter()
                .map(|r| (r.name.clone(), r))
                .collect(),
            cache: RwLock::new(HashMap::new()),
            reload: Mutex::new(()),
        }
    }

    /// Union of permissions over the named roles for a tenant.
    ///
    /// Unknown role names contribute nothing; a revoked role must not keep
    /// granting through stale bindings.
    ///
    /// # Errors
    ///
    /// Propagates role-source failures when a refresh is needed.
    pub async fn effective_permissions(
        &self,
        tenant_id: &str,
        role_names: &[String],
    ) -> Result<Vec<String>, RbacError> {
        self.ensure_fresh(tenant_id).await?;
        let cache = self.cache.read().await;
        let tenant_roles = cache.get(tenant_id);

        let mut permissions = BTreeSet::new();
        for name in role_names {
            let role = self
                .builtins
                .get(name)
                .or_else(|| tenant_roles.and_then(|c| c.by_name.get(name)));
            if let Some(role) = role {
                permissions.extend(role.permissions.iter().cloned());
            }
        }
        Ok(permissions.into_iter().collect())
    }

    /// Whether the named roles grant `resource:action` in this tenant.
    ///
    /// # Errors
    ///
    /// Propagates role-source failures.
    pub async fn has(
        &self,
        tenant_id: &str,
        role_names: &[String],
        resource: &str,
        action: &str,
    ) -> Result<bool, RbacError> {
        let effective = self.effective_permissions(tenant_id, role_names).await?;
        Ok(any_permission_matches(&effective, resource, action))
    }

    /// Like [`has`](Self::has) but fails with a diagnostic error on deny.
    ///
    /// # Errors
    ///
    /// [`RbacError::InsufficientPermissions`] carrying the required
    /// permission and the caller's effective set.
    pub async fn require(
        &self,
        tenant_id: &str,
        role_names: &[String],
        resource: &str,
        action: &str,
    ) -> Result<(), RbacError> {
        let effective = self.effective_permissions(tenant_id, role_names).await?;
        if any_permission_matches(&effective, resource, action) {
            Ok(())
        } else {
            Err(RbacError::InsufficientPermissions {
                required: format!("{resource}:{action}"),
                effective,
            })
        }
    }

    /// Drop a tenant's cached roles; the next check reloads.
    pub async fn invalidate(&self, tenant_id: &str) {
        self.cache.write().await.remove(tenant_id);
    }

    async fn ensure_fresh(&self, tenant_id: &str) -> Result<(), RbacError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(tenant_id) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(());
                }
            }
        }

        // Single-flight: one reload at a time; losers re-check the cache
        // before hitting the source again.
        let _guard = self.reload.lock().await;
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(tenant_id) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(());
                }
            }
        }

        let roles = self.source.load_roles(tenant_id).await?;
        tracing::debug!(tenant_id, roles = roles.len(), "rbac roles refreshed");
        self.cache.write().await.insert(
            tenant_id.to_string(),
            CachedRoles {
                by_name: roles.into_iter().map(|r| (r.name.clone(), r)).collect(),
                fetched_at: Instant::now(),
            },
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(roles: &[&str]) -> Vec<String> {
        roles.iter().map(|s| s.to_string()).collect()
    }

    // -- matching ---------------------------------------------------------

    #[test]
    fn exact_and_wildcard_matching() {
        assert!(permission_matches("workflows:read", "workflows", "read"));
        assert!(permission_matches("workflows:*", "workflows", "write"));
        assert!(permission_matches("*:*", "budgets", "delete"));
        assert!(!permission_matches("workflows:read", "agents", "read"));
        assert!(!permission_matches("workflows", "workflows", "read"));
        // A bare `*:action` form grants nothing.
        assert!(!permission_matches("*:read", "workflows", "read"));
    }

    // -- built-ins --------------------------------------------------------

    #[test]
    fn builtins_cover_expected_matrix() {
        let roles = builtin_roles();
        let admin = &roles[0];
        let developer = &roles[1];
        let viewer = &roles[2];

        assert!(any_permission_matches(&admin.permissions, "anything", "x"));
        assert!(any_permission_matches(
            &developer.permissions,
            "workflows",
            "write"
        ));
        assert!(any_permission_matches(&viewer.permissions, "tools", "read"));
        assert!(!any_permission_matches(
            &viewer.permissions,
            "workflows",
            "write"
        ));
        assert!(!any_permission_matches(
            &developer.permissions,
            "rbac_roles",
            "write"
        ));
    }

    // -- engine -----------------------------------------------------------

    #[tokio::test]
    async fn viewer_reads_but_cannot_write() {
        let source = Arc::new(StaticRoleSource::new());
        let engine = RbacEngine::new(source, Duration::from_secs(60));

        assert!(
            engine
                .has("t1", &names(&["viewer"]), "workflows", "read")
                .await
                .unwrap()
        );
        let err = engine
            .require("t1", &names(&["viewer"]), "workflows", "write")
            .await
            .unwrap_err();
        match err {
            RbacError::InsufficientPermissions { required, effective } => {
                assert_eq!(required, "workflows:write");
                assert!(effective.contains(&"workflows:read".to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn custom_roles_union_with_builtins() {
        let source = Arc::new(StaticRoleSource::new());
        source
            .put(
                "t1",
                vec![Role {
                    name: "auditor".into(),
                    permissions: ["audits:read".to_string()].into_iter().collect(),
                    tenant_id: Some("t1".into()),
                }],
            )
            .await;
        let engine = RbacEngine::new(source, Duration::from_secs(60));

        let effective = engine
            .effective_permissions("t1", &names(&["viewer", "auditor"]))
            .await
            .unwrap();
        assert!(effective.contains(&"audits:read".to_string()));
        assert!(effective.contains(&"workflows:read".to_string()));
    }

    #[tokio::test]
    async fn unknown_roles_grant_nothing() {
        let source = Arc::new(StaticRoleSource::new());
        let engine = RbacEngine::new(source, Duration::from_secs(60));
        let effective = engine
            .effective_permissions("t1", &names(&["ghost"]))
            .await
            .unwrap();
        assert!(effective.is_empty());
    }

    #[tokio::test]
    async fn custom_roles_are_tenant_local() {
        let source = Arc::new(StaticRoleSource::new());
        source
            .put("t1", vec![Role::new("ops", ["agents:write"])])
            .await;
        let engine = RbacEngine::new(source, Duration::from_secs(60));

        assert!(
            engine
                .has("t1", &names(&["ops"]), "agents", "write")
                .await
                .unwrap()
        );
        assert!(
            !engine
                .has("t2", &names(&["ops"]), "agents", "write")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn invalidate_picks_up_role_edits() {
        let source = Arc::new(StaticRoleSource::new());
        source
            .put("t1", vec![Role::new("ops", ["agents:read"])])
            .await;
        let engine = RbacEngine::new(source.clone(), Duration::from_secs(3600));

        assert!(
            !engine
                .has("t1", &names(&["ops"]), "agents", "write")
                .await
                .unwrap()
        );

        source
            .put("t1", vec![Role::new("ops", ["agents:read", "agents:write"])])
            .await;
        // Within the TTL the stale grant persists until invalidation.
        assert!(
            !engine
                .has("t1", &names(&["ops"]), "agents", "write")
                .await
                .unwrap()
        );
        engine.invalidate("t1").await;
        assert!(
            engine
                .has("t1", &names(&["ops"]), "agents", "write")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn refresh_is_single_flight_within_ttl() {
        struct CountingSource(AtomicUsize);

        #[async_trait]
        impl RoleSource for CountingSource {
            async fn load_roles(&self, _tenant_id: &str) -> Result<Vec<Role>, RbacError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(vec![])
            }
        }

        let source = Arc::new(CountingSource(AtomicUsize::new(0)));
        let engine = Arc::new(RbacEngine::new(source.clone(), Duration::from_secs(60)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .has("t1", &names(&["viewer"]), "workflows", "read")
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert!(h.await.unwrap());
        }
        assert_eq!(source.0.load(Ordering::SeqCst), 1);
    }
}

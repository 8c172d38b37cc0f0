// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed records for the control-plane tables.
//!
//! Records convert to and from [`Row`]s through their serde representation,
//! so the column set is exactly the field set. Tenant-scoped tables all
//! carry a `tenant_id` column; `plans` inherits tenancy transitively through
//! its workflow and deliberately has none.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{DbError, Row};

/// Convert a record into a row.
///
/// # Errors
///
/// Returns [`DbError::Malformed`] when the record does not serialize to an
/// object (never the case for the types in this module).
pub fn to_row<T: Serialize>(record: &T) -> Result<Row, DbError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(_) => Err(DbError::Malformed {
            reason: "record did not serialize to an object".to_string(),
        }),
        Err(e) => Err(DbError::Malformed {
            reason: format!("record serialization failed: {e}"),
        }),
    }
}

/// Convert a row back into a record.
///
/// # Errors
///
/// Returns [`DbError::Malformed`] when required columns are missing or
/// mistyped.
pub fn from_row<T: for<'de> Deserialize<'de>>(row: &Row) -> Result<T, DbError> {
    let value = Value::Object(row.clone().into_iter().collect());
    serde_json::from_value(value).map_err(|e| DbError::Malformed {
        reason: format!("row decode failed: {e}"),
    })
}

/// Subscription tier of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantTier {
    /// Free tier.
    Free,
    /// Paid tier.
    Pro,
    /// Contract tier.
    Enterprise,
}

/// A tenant — the top-level isolation boundary. Never re-keyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    /// Opaque tenant id.
    pub id: String,
    /// Human name.
    pub name: String,
    /// Subscription tier.
    pub tier: TenantTier,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A user. Belongs to exactly one tenant; the linkage is immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// User id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Email, unique within the tenant.
    pub email: String,
    /// Hashed credential, when password auth is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A per-tenant role: a named permission set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Role id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Role name, unique within the tenant.
    pub name: String,
    /// Permission strings of the form `resource:action`.
    pub permissions: Vec<String>,
}

/// Binds a user to a role within a tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BindingRecord {
    /// Binding id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Bound user.
    pub user_id: String,
    /// Bound role.
    pub role_id: String,
}

/// A workflow definition. `(tenant_id, name, version)` is unique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// Workflow id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Workflow name.
    pub name: String,
    /// Monotonic version within `(tenant, name)`.
    pub version: u32,
    /// Definition document (planner input).
    pub definition: String,
    /// Which planner produced/consumes the definition.
    pub planner_kind: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// A plan produced for a workflow. Tenancy is inherited through the
/// workflow; the table is intentionally unscoped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Plan id.
    pub id: String,
    /// Owning workflow.
    pub workflow_id: String,
    /// Ordered step list (estimator input), as JSON.
    pub steps: Value,
    /// Agent/tool assignments, as JSON.
    pub assignments: Value,
    /// Estimated total cost in dollars.
    pub estimated_cost: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A registered agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Agent name.
    pub name: String,
    /// Agent kind (e.g. `planner`, `executor`).
    pub kind: String,
    /// Current status.
    pub status: String,
}

/// A registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRecord {
    /// Tool id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Tool name.
    pub name: String,
    /// Declared cost model, as JSON.
    pub cost_model: Value,
}

/// A budget row. Mutated only via atomic accumulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetRecord {
    /// Budget id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// Scope selector: `global`, `workflow:<id>`, or `user:<id>`.
    pub scope: String,
    /// Hard limit in dollars.
    pub limit_dollars: f64,
    /// Usage accumulated in the current period.
    pub current_usage: f64,
    /// Accounting period (e.g. `daily`, `monthly`).
    pub period: String,
}

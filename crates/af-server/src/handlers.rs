// SPDX-License-Identifier: MIT OR Apache-2.0
//! Route handlers.
//!
//! Handlers stay thin: they parse input, reach the tenant-scoped data
//! layer, record audit entries for every mutation, and hand domain errors
//! back as [`ApiFailure`]s. Cross-tenant reads answer `NOT_FOUND` without
//! revealing existence, and the attempt is audited.

use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

use af_audit::{ActorType, AuditDraft};
use af_core::context::{TenantContext, TraceContext};
use af_cost::{Budget, BudgetCheck, BudgetPeriod, BudgetScope, Plan, PlanStep};
use af_error::{ControlError, ErrorCode};
use af_ratelimit::Decision;
use af_store::Row;
use af_store::records::{AgentRecord, ToolRecord, WorkflowRecord, from_row, to_row};
use af_tenancy::{MediationError, ScopedDbError};

use crate::api::{ApiFailure, ResponseMeta, api_ok};
use crate::middleware::CorrelationId;
use crate::state::AppState;

type HandlerResult = Result<Response, ApiFailure>;

fn meta(cid: &CorrelationId, rate: Option<Extension<Decision>>) -> ResponseMeta {
    ResponseMeta::new(cid.0.clone(), rate.map(|Extension(d)| d))
}

fn parse_body<T: for<'de> Deserialize<'de>>(
    bytes: &Bytes,
    cid: &CorrelationId,
) -> Result<T, ApiFailure> {
    serde_json::from_slice(bytes).map_err(|e| {
        ApiFailure::new(
            ControlError::validation("request body failed validation")
                .with_detail("reason", e.to_string()),
            cid.0.clone(),
        )
    })
}

fn db_failure(e: ScopedDbError, cid: &CorrelationId) -> ApiFailure {
    let error = match &e {
        ScopedDbError::Mediation(MediationError::CrossTenant { table, .. }) => {
            ControlError::new(ErrorCode::CrossTenantDenied, "cross-tenant access denied")
                .with_detail("table", table)
        }
        _ => ControlError::internal("data access failed").with_source(e),
    };
    ApiFailure::new(error, cid.0.clone())
}

/// Build `INSERT INTO <table> (…) VALUES (…)` from a record row. Column
/// order is deterministic (rows are BTreeMaps).
fn insert_sql(table: &str, row: &Row) -> (String, Vec<Value>) {
    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    (
        format!(
            "INSERT INTO {table} ({}) VALUES ({placeholders})",
            columns.join(", ")
        ),
        row.values().cloned().collect(),
    )
}

/// Shared not-found path for id lookups: when the row exists under another
/// tenant, audit the attempt; either way the caller learns only
/// `NOT_FOUND`.
async fn not_found(
    state: &AppState,
    ctx: &TenantContext,
    cid: &CorrelationId,
    table: &str,
    resource_type: &str,
    id: &str,
) -> ApiFailure {
    let probe = state
        .db
        .raw()
        .query(
            &format!("-- admin\nSELECT * FROM {table} WHERE id = ?"),
            &[Value::from(id)],
        )
        .await;

    if let Ok(rows) = probe {
        if let Some(other_tenant) = rows
            .first()
            .and_then(|row| row.get("tenant_id"))
            .and_then(Value::as_str)
            .filter(|t| *t != ctx.tenant_id)
        {
            let draft = AuditDraft::new(
                &ctx.tenant_id,
                ActorType::User,
                ctx.user_id.as_deref().unwrap_or("anonymous"),
                "cross_tenant_attempt",
                resource_type,
            )
            .resource_id(id)
            .details(json!({
                "target_tenant": other_tenant,
                "correlation_id": cid.0,
            }));
            if let Err(e) = state.audit.append(draft).await {
                tracing::error!(error = %e, "failed to audit cross-tenant attempt");
            }
        }
    }

    ApiFailure::new(
        ControlError::not_found(format!("{resource_type} not found")),
        cid.0.clone(),
    )
}

async fn record_audit(state: &AppState, draft: AuditDraft) {
    if let Err(e) = state.audit.append(draft).await {
        tracing::error!(error = %e, "audit append failed");
    }
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// `GET /api/v1/health` — liveness with service metadata. Never requires
/// auth and never 5xx while the process is serving.
pub async fn health(
    State(state): State<AppState>,
    Extension(cid): Extension<CorrelationId>,
) -> Response {
    api_ok(
        StatusCode::OK,
        json!({
            "status": "ok",
            "version": af_core::CONTRACT_VERSION,
            "uptime_seconds": state.started_at.elapsed().as_secs(),
        }),
        meta(&cid, None),
    )
}

// ---------------------------------------------------------------------------
// Workflows
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateWorkflow {
    name: String,
    #[serde(default = "default_version")]
    version: u32,
    #[serde(default)]
    definition: String,
    #[serde(default = "default_planner")]
    planner_kind: String,
}

fn default_version() -> u32 {
    1
}
fn default_planner() -> String {
    "static".to_string()
}

/// `GET /api/v1/workflows`
pub async fn list_workflows(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
) -> HandlerResult {
    let rows = state
        .db
        .query(&ctx, "SELECT * FROM workflows ORDER BY created_at", &[])
        .await
        .map_err(|e| db_failure(e, &cid))?;
    let workflows: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(row.clone().into_iter().collect()))
        .collect();
    Ok(api_ok(
        StatusCode::OK,
        json!({ "workflows": workflows }),
        meta(&cid, rate),
    ))
}

/// `POST /api/v1/workflows`
pub async fn create_workflow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    body: Bytes,
) -> HandlerResult {
    let input: CreateWorkflow = parse_body(&body, &cid)?;
    if input.name.trim().is_empty() {
        return Err(ApiFailure::new(
            ControlError::validation("workflow name must not be empty"),
            cid.0.clone(),
        ));
    }

    // (tenant, name, version) is unique.
    let existing = state
        .db
        .query(
            &ctx,
            "SELECT * FROM workflows WHERE name = ? AND version = ?",
            &[Value::from(input.name.clone()), Value::from(input.version)],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;
    if !existing.is_empty() {
        return Err(ApiFailure::new(
            ControlError::conflict("workflow name/version already exists")
                .with_detail("name", &input.name)
                .with_detail("version", input.version),
            cid.0.clone(),
        ));
    }

    let now = Utc::now();
    let record = WorkflowRecord {
        id: ulid::Ulid::new().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name: input.name,
        version: input.version,
        definition: input.definition,
        planner_kind: input.planner_kind,
        created_at: now,
        updated_at: now,
    };
    let row = to_row(&record).map_err(|e| {
        ApiFailure::new(ControlError::internal("encode record").with_source(e), cid.0.clone())
    })?;
    let (sql, params) = insert_sql("workflows", &row);
    state
        .db
        .execute(&ctx, &sql, &params)
        .await
        .map_err(|e| db_failure(e, &cid))?;

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "workflow_created",
            "workflow",
        )
        .resource_id(&record.id)
        .details(json!({ "name": record.name, "version": record.version })),
    )
    .await;

    Ok(api_ok(
        StatusCode::CREATED,
        serde_json::to_value(&record).unwrap_or_default(),
        meta(&cid, rate),
    ))
}

/// `GET /api/v1/workflows/{id}`
pub async fn get_workflow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    Path(id): Path<String>,
) -> HandlerResult {
    let rows = state
        .db
        .query(
            &ctx,
            "SELECT * FROM workflows WHERE id = ?",
            &[Value::from(id.clone())],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;

    match rows.first() {
        Some(row) => Ok(api_ok(
            StatusCode::OK,
            Value::Object(row.clone().into_iter().collect()),
            meta(&cid, rate),
        )),
        None => Err(not_found(&state, &ctx, &cid, "workflows", "workflow", &id).await),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkflow {
    definition: String,
}

/// `PUT /api/v1/workflows/{id}`
pub async fn update_workflow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let input: UpdateWorkflow = parse_body(&body, &cid)?;
    let affected = state
        .db
        .execute(
            &ctx,
            "UPDATE workflows SET definition = ?, updated_at = ? WHERE id = ?",
            &[
                Value::from(input.definition),
                Value::from(Utc::now().to_rfc3339()),
                Value::from(id.clone()),
            ],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;

    if affected == 0 {
        return Err(not_found(&state, &ctx, &cid, "workflows", "workflow", &id).await);
    }

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "workflow_updated",
            "workflow",
        )
        .resource_id(&id),
    )
    .await;

    Ok(api_ok(StatusCode::OK, json!({ "id": id }), meta(&cid, rate)))
}

/// `DELETE /api/v1/workflows/{id}`
pub async fn delete_workflow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    Path(id): Path<String>,
) -> HandlerResult {
    let affected = state
        .db
        .execute(
            &ctx,
            "DELETE FROM workflows WHERE id = ?",
            &[Value::from(id.clone())],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;
    if affected == 0 {
        return Err(not_found(&state, &ctx, &cid, "workflows", "workflow", &id).await);
    }

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "workflow_deleted",
            "workflow",
        )
        .resource_id(&id),
    )
    .await;

    Ok(api_ok(StatusCode::OK, json!({ "id": id }), meta(&cid, rate)))
}

// ---------------------------------------------------------------------------
// Workflow start (budget admission)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct StartWorkflow {
    #[serde(default)]
    steps: Vec<PlanStep>,
}

/// `POST /api/v1/workflows/{id}/start`
///
/// Estimates the submitted plan and rejects the start when the projection
/// breaks an active budget. Admitted starts accumulate the estimate and
/// publish `execution.started` on the workflow stream.
pub async fn start_workflow(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    Extension(trace): Extension<TraceContext>,
    rate: Option<Extension<Decision>>,
    Path(id): Path<String>,
    body: Bytes,
) -> HandlerResult {
    let input: StartWorkflow = parse_body(&body, &cid)?;

    let rows = state
        .db
        .query(
            &ctx,
            "SELECT * FROM workflows WHERE id = ?",
            &[Value::from(id.clone())],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;
    let Some(row) = rows.first() else {
        return Err(not_found(&state, &ctx, &cid, "workflows", "workflow", &id).await);
    };
    let workflow: WorkflowRecord = from_row(row).map_err(|e| {
        ApiFailure::new(ControlError::internal("decode workflow").with_source(e), cid.0.clone())
    })?;

    let plan = Plan {
        workflow_id: workflow.id.clone(),
        steps: input.steps,
    };
    let estimate = state.estimator.estimate(&ctx.tenant_id, &plan);

    match state
        .budgets
        .check_estimate(&ctx.tenant_id, &workflow.id, estimate.total)
    {
        BudgetCheck::Warning { scope, overage } => {
            return Err(ApiFailure::new(
                ControlError::conflict("budget would be exceeded")
                    .with_detail("estimate_total", estimate.total)
                    .with_detail("overage", overage)
                    .with_detail("scope", serde_json::to_value(&scope).unwrap_or_default()),
                cid.0.clone(),
            ));
        }
        BudgetCheck::Ok => {}
    }

    // Admission accounting happens here; completion accounting happens when
    // the runtime reports back.
    state
        .budgets
        .accumulate(&ctx.tenant_id, &BudgetScope::Global, estimate.total);
    state.budgets.accumulate(
        &ctx.tenant_id,
        &BudgetScope::Workflow(workflow.id.clone()),
        estimate.total,
    );

    let envelope = af_core::EnvelopeBuilder::new(
        "control-plane",
        "workflow-runtime",
        af_core::MessageKind::Event,
    )
    .payload(json!({
        "workflow_id": workflow.id,
        "workflow_name": workflow.name,
        "estimate_total": estimate.total,
    }))
    .metadata("correlation_id", cid.0.clone())
    .build();

    state
        .bus
        .publish(
            &ctx.tenant_id,
            af_bus::STREAM_WORKFLOWS,
            "execution.started",
            envelope,
            Some(&trace),
        )
        .await
        .map_err(|e| {
            ApiFailure::new(
                ControlError::upstream("message bus publish failed").with_source(e),
                cid.0.clone(),
            )
        })?;

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "workflow_started",
            "workflow",
        )
        .resource_id(&workflow.id)
        .details(json!({ "estimate_total": estimate.total })),
    )
    .await;

    Ok(api_ok(
        StatusCode::ACCEPTED,
        json!({
            "workflow_id": workflow.id,
            "status": "started",
            "estimate": estimate,
        }),
        meta(&cid, rate),
    ))
}

// ---------------------------------------------------------------------------
// Plans (estimation)
// ---------------------------------------------------------------------------

/// `POST /api/v1/plans/estimate`
pub async fn estimate_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    body: Bytes,
) -> HandlerResult {
    let plan: Plan = parse_body(&body, &cid)?;
    let estimate = state.estimator.estimate(&ctx.tenant_id, &plan);
    let budget_check = state
        .budgets
        .check_estimate(&ctx.tenant_id, &plan.workflow_id, estimate.total);

    Ok(api_ok(
        StatusCode::OK,
        json!({
            "estimate": estimate,
            "budget_check": budget_check,
        }),
        meta(&cid, rate),
    ))
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateAgent {
    name: String,
    #[serde(default = "default_agent_kind")]
    kind: String,
}

fn default_agent_kind() -> String {
    "executor".to_string()
}

/// `GET /api/v1/agents`
pub async fn list_agents(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
) -> HandlerResult {
    let rows = state
        .db
        .query(&ctx, "SELECT * FROM agents ORDER BY name", &[])
        .await
        .map_err(|e| db_failure(e, &cid))?;
    let agents: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(row.clone().into_iter().collect()))
        .collect();
    Ok(api_ok(StatusCode::OK, json!({ "agents": agents }), meta(&cid, rate)))
}

/// `POST /api/v1/agents`
pub async fn create_agent(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    body: Bytes,
) -> HandlerResult {
    let input: CreateAgent = parse_body(&body, &cid)?;
    if input.name.trim().is_empty() {
        return Err(ApiFailure::new(
            ControlError::validation("agent name must not be empty"),
            cid.0.clone(),
        ));
    }

    let record = AgentRecord {
        id: ulid::Ulid::new().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name: input.name,
        kind: input.kind,
        status: "idle".to_string(),
    };
    let row = to_row(&record).map_err(|e| {
        ApiFailure::new(ControlError::internal("encode record").with_source(e), cid.0.clone())
    })?;
    let (sql, params) = insert_sql("agents", &row);
    state
        .db
        .execute(&ctx, &sql, &params)
        .await
        .map_err(|e| db_failure(e, &cid))?;

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "agent_registered",
            "agent",
        )
        .resource_id(&record.id),
    )
    .await;

    Ok(api_ok(
        StatusCode::CREATED,
        serde_json::to_value(&record).unwrap_or_default(),
        meta(&cid, rate),
    ))
}

/// `GET /api/v1/agents/{id}`
pub async fn get_agent(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    Path(id): Path<String>,
) -> HandlerResult {
    let rows = state
        .db
        .query(
            &ctx,
            "SELECT * FROM agents WHERE id = ?",
            &[Value::from(id.clone())],
        )
        .await
        .map_err(|e| db_failure(e, &cid))?;
    match rows.first() {
        Some(row) => Ok(api_ok(
            StatusCode::OK,
            Value::Object(row.clone().into_iter().collect()),
            meta(&cid, rate),
        )),
        None => Err(not_found(&state, &ctx, &cid, "agents", "agent", &id).await),
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateTool {
    name: String,
    #[serde(default)]
    cost_model: Value,
}

/// `GET /api/v1/tools`
pub async fn list_tools(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
) -> HandlerResult {
    let rows = state
        .db
        .query(&ctx, "SELECT * FROM tools ORDER BY name", &[])
        .await
        .map_err(|e| db_failure(e, &cid))?;
    let tools: Vec<Value> = rows
        .iter()
        .map(|row| Value::Object(row.clone().into_iter().collect()))
        .collect();
    Ok(api_ok(StatusCode::OK, json!({ "tools": tools }), meta(&cid, rate)))
}

/// `POST /api/v1/tools`
pub async fn create_tool(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    body: Bytes,
) -> HandlerResult {
    let input: CreateTool = parse_body(&body, &cid)?;
    if input.name.trim().is_empty() {
        return Err(ApiFailure::new(
            ControlError::validation("tool name must not be empty"),
            cid.0.clone(),
        ));
    }

    let record = ToolRecord {
        id: ulid::Ulid::new().to_string(),
        tenant_id: ctx.tenant_id.clone(),
        name: input.name,
        cost_model: input.cost_model,
    };
    let row = to_row(&record).map_err(|e| {
        ApiFailure::new(ControlError::internal("encode record").with_source(e), cid.0.clone())
    })?;
    let (sql, params) = insert_sql("tools", &row);
    state
        .db
        .execute(&ctx, &sql, &params)
        .await
        .map_err(|e| db_failure(e, &cid))?;

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "tool_registered",
            "tool",
        )
        .resource_id(&record.id),
    )
    .await;

    Ok(api_ok(
        StatusCode::CREATED,
        serde_json::to_value(&record).unwrap_or_default(),
        meta(&cid, rate),
    ))
}

// ---------------------------------------------------------------------------
// Budgets
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct PutBudget {
    scope: String,
    limit_dollars: f64,
    #[serde(default = "default_period")]
    period: String,
}

fn default_period() -> String {
    "monthly".to_string()
}

fn parse_scope(raw: &str) -> Option<BudgetScope> {
    if raw == "global" {
        return Some(BudgetScope::Global);
    }
    if let Some(id) = raw.strip_prefix("workflow:") {
        return Some(BudgetScope::Workflow(id.to_string()));
    }
    if let Some(id) = raw.strip_prefix("user:") {
        return Some(BudgetScope::User(id.to_string()));
    }
    None
}

/// `GET /api/v1/budgets`
pub async fn list_budgets(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
) -> HandlerResult {
    let budgets = state.budgets.for_tenant(&ctx.tenant_id);
    Ok(api_ok(
        StatusCode::OK,
        json!({ "budgets": budgets }),
        meta(&cid, rate),
    ))
}

/// `PUT /api/v1/budgets`
pub async fn put_budget(
    State(state): State<AppState>,
    Extension(ctx): Extension<TenantContext>,
    Extension(cid): Extension<CorrelationId>,
    rate: Option<Extension<Decision>>,
    body: Bytes,
) -> HandlerResult {
    let input: PutBudget = parse_body(&body, &cid)?;
    let Some(scope) = parse_scope(&input.scope) else {
        return Err(ApiFailure::new(
            ControlError::validation("scope must be 'global', 'workflow:<id>', or 'user:<id>'")
                .with_detail("scope", &input.scope),
            cid.0.clone(),
        ));
    };
    if input.limit_dollars < 0.0 {
        return Err(ApiFailure::new(
            ControlError::validation("limit_dollars must be non-negative"),
            cid.0.clone(),
        ));
    }
    let period = match input.period.as_str() {
        "daily" => BudgetPeriod::Daily,
        "monthly" => BudgetPeriod::Monthly,
        other => {
            return Err(ApiFailure::new(
                ControlError::validation("period must be 'daily' or 'monthly'")
                    .with_detail("period", other),
                cid.0.clone(),
            ));
        }
    };

    // Replacing a budget keeps the usage already accumulated this period.
    let current_usage = state
        .budgets
        .get(&ctx.tenant_id, &scope)
        .map_or(0.0, |b| b.current_usage);
    let budget = Budget {
        tenant_id: ctx.tenant_id.clone(),
        scope,
        limit_dollars: input.limit_dollars,
        current_usage,
        period,
    };
    state.budgets.set_budget(budget.clone());

    record_audit(
        &state,
        AuditDraft::new(
            &ctx.tenant_id,
            ActorType::User,
            ctx.user_id.as_deref().unwrap_or("anonymous"),
            "budget_updated",
            "budget",
        )
        .details(json!({ "scope": input.scope, "limit_dollars": input.limit_dollars })),
    )
    .await;

    Ok(api_ok(
        StatusCode::OK,
        serde_json::to_value(&budget).unwrap_or_default(),
        meta(&cid, rate),
    ))
}

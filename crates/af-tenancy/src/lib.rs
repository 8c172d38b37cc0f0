// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-tenancy
#![deny(unsafe_code)]
#![warn(missing_docs)]

use af_core::context::TenantContext;
use af_store::{Database, DbError, Row};
use serde_json::Value;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Tables that carry a `tenant_id` column and must always be scoped.
///
/// `tenants` is the boundary itself and `plans` inherits tenancy through its
/// workflow (enforced at the handler layer); both pass through untouched.
pub const SCOPED_TABLES: &[&str] = &[
    "users",
    "agents",
    "workflows",
    "messages",
    "tools",
    "audits",
    "budgets",
    "rbac_roles",
    "rbac_bindings",
];

/// Whether `table` is in the scoped catalog.
#[must_use]
pub fn is_scoped_table(table: &str) -> bool {
    SCOPED_TABLES.contains(&table)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// What the mediator decided a statement is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// `SELECT … FROM …`
    Select,
    /// `INSERT INTO …`
    Insert,
    /// `UPDATE …`
    Update,
    /// `DELETE FROM …`
    Delete,
    /// Out of mediation scope; passes through untouched.
    Skip(SkipReason),
}

/// Why a statement bypasses mediation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Carries the explicit `-- admin` marker.
    Admin,
    /// Schema statements (CREATE/ALTER/DROP/TRUNCATE/GRANT).
    Ddl,
    /// The `SELECT 1` health ping.
    HealthPing,
    /// Anything else the classifier does not recognize as DML.
    Unrecognized,
}

/// Classify a statement. Keyword driven; no SQL grammar involved.
#[must_use]
pub fn classify(sql: &str) -> StatementKind {
    let trimmed = sql.trim_start();
    if trimmed.starts_with("-- admin") {
        return StatementKind::Skip(SkipReason::Admin);
    }
    let body = strip_leading_comments(trimmed);
    let lower = body.trim().trim_end_matches(';').trim().to_lowercase();

    if lower == "select 1" {
        return StatementKind::Skip(SkipReason::HealthPing);
    }
    for ddl in ["create ", "alter ", "drop ", "truncate ", "grant ", "revoke "] {
        if lower.starts_with(ddl) {
            return StatementKind::Skip(SkipReason::Ddl);
        }
    }
    if lower.starts_with("select ") {
        StatementKind::Select
    } else if lower.starts_with("insert into ") {
        StatementKind::Insert
    } else if lower.starts_with("update ") {
        StatementKind::Update
    } else if lower.starts_with("delete from ") {
        StatementKind::Delete
    } else {
        StatementKind::Skip(SkipReason::Unrecognized)
    }
}

fn strip_leading_comments(sql: &str) -> &str {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start();
        if let Some(stripped) = trimmed.strip_prefix("--") {
            match stripped.find('\n') {
                Some(nl) => rest = &stripped[nl + 1..],
                None => return "",
            }
        } else {
            return trimmed;
        }
    }
}

/// Extract the primary table of a DML statement.
#[must_use]
pub fn primary_table(sql: &str, kind: StatementKind) -> Option<String> {
    let body = strip_leading_comments(sql.trim_start());
    let lower = body.to_lowercase();
    let after = match kind {
        StatementKind::Select | StatementKind::Delete => {
            let idx = find_keyword(&lower, "from")?;
            &body[idx + 4..]
        }
        StatementKind::Insert => {
            let idx = find_keyword(&lower, "into")?;
            &body[idx + 4..]
        }
        StatementKind::Update => {
            let idx = find_keyword(&lower, "update")?;
            &body[idx + 6..]
        }
        StatementKind::Skip(_) => return None,
    };
    let word = after
        .split_whitespace()
        .next()?
        .trim_matches(|c| c == '"' || c == '`' || c == '(' || c == ';');
    if word.is_empty() {
        None
    } else {
        Some(word.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Mediation
// ---------------------------------------------------------------------------

/// Errors raised by the mediator.
#[derive(Debug, thiserror::Error)]
pub enum MediationError {
    /// The statement addresses a tenant other than the caller's.
    ///
    /// Callers convert this into an audited denial; the mediator itself
    /// never executes the statement.
    #[error("cross-tenant access blocked on '{table}': statement targets '{found}'")]
    CrossTenant {
        /// Table the statement addressed.
        table: String,
        /// Tenant the statement tried to reach.
        found: String,
    },

    /// An INSERT into a scoped table does not set `tenant_id`.
    #[error("insert into scoped table '{table}' lacks a tenant_id column")]
    MissingTenantColumn {
        /// The scoped table.
        table: String,
    },

    /// The mediator could not make a safe decision.
    #[error("statement not mediatable: {reason}")]
    Unsupported {
        /// What stopped the mediator.
        reason: String,
    },
}

/// Outcome of mediating one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mediated {
    /// The statement to execute (possibly rewritten).
    pub sql: String,
    /// When `true`, the caller must append the context tenant id to the
    /// parameter list (the rewrite added a trailing `tenant_id = ?`).
    pub bind_tenant: bool,
}

impl Mediated {
    fn passthrough(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            bind_tenant: false,
        }
    }
}

/// Mediate `sql` for the given tenant.
///
/// `params` are the caller's bindings, used to verify placeholder-bound
/// tenant predicates. The mediator never mutates them; when the returned
/// [`Mediated::bind_tenant`] is set the caller appends the tenant id itself.
///
/// # Errors
///
/// [`MediationError::CrossTenant`] when the statement addresses another
/// tenant, [`MediationError::MissingTenantColumn`] for unscoped inserts,
/// [`MediationError::Unsupported`] when no safe decision is possible.
pub fn mediate(
    tenant_id: &str,
    sql: &str,
    params: &[Value],
) -> Result<Mediated, MediationError> {
    let kind = classify(sql);
    let table = match kind {
        StatementKind::Skip(_) => return Ok(Mediated::passthrough(sql)),
        _ => primary_table(sql, kind).ok_or_else(|| MediationError::Unsupported {
            reason: "cannot determine primary table".to_string(),
        })?,
    };

    if !is_scoped_table(&table) {
        return Ok(Mediated::passthrough(sql));
    }

    match kind {
        StatementKind::Insert => mediate_insert(tenant_id, sql, params, &table),
        StatementKind::Select | StatementKind::Update | StatementKind::Delete => {
            mediate_filtered(tenant_id, sql, params, &table)
        }
        StatementKind::Skip(_) => unreachable!("skips returned above"),
    }
}

fn mediate_insert(
    tenant_id: &str,
    sql: &str,
    params: &[Value],
    table: &str,
) -> Result<Mediated, MediationError> {
    let lower = sql.to_lowercase();
    let open = lower.find('(').ok_or_else(|| MediationError::Unsupported {
        reason: "INSERT without column list".to_string(),
    })?;
    let close = lower[open..]
        .find(')')
        .map(|i| i + open)
        .ok_or_else(|| MediationError::Unsupported {
            reason: "unterminated column list".to_string(),
        })?;

    let columns: Vec<&str> = lower[open + 1..close].split(',').map(str::trim).collect();
    let Some(tenant_pos) = columns.iter().position(|c| *c == "tenant_id") else {
        return Err(MediationError::MissingTenantColumn {
            table: table.to_string(),
        });
    };

    // Locate the value bound to the tenant_id column and verify it.
    let values_open = lower[close..]
        .find('(')
        .map(|i| i + close)
        .ok_or_else(|| MediationError::Unsupported {
            reason: "INSERT without VALUES tuple".to_string(),
        })?;
    let values_close =
        lower.rfind(')').ok_or_else(|| MediationError::Unsupported {
            reason: "unterminated VALUES tuple".to_string(),
        })?;
    let value_tokens: Vec<&str> = sql[values_open + 1..values_close]
        .split(',')
        .map(str::trim)
        .collect();
    let token = value_tokens
        .get(tenant_pos)
        .ok_or_else(|| MediationError::Unsupported {
            reason: "column/value arity mismatch".to_string(),
        })?;

    match bound_value(sql, values_open, &value_tokens, tenant_pos, token, params) {
        Some(found) if found != tenant_id => Err(MediationError::CrossTenant {
            table: table.to_string(),
            found,
        }),
        _ => Ok(Mediated::passthrough(sql)),
    }
}

fn mediate_filtered(
    tenant_id: &str,
    sql: &str,
    params: &[Value],
    table: &str,
) -> Result<Mediated, MediationError> {
    let lower = sql.to_lowercase();

    if let Some(pred_idx) = find_tenant_predicate(&lower) {
        // Statement already filters on tenant_id: verify instead of rewrite.
        let after_eq = match sql[pred_idx..].find('=') {
            Some(rel) => sql[pred_idx + rel + 1..].trim_start(),
            None => {
                return Err(MediationError::Unsupported {
                    reason: "tenant_id predicate without equality".to_string(),
                });
            }
        };
        let token = after_eq
            .split(|c: char| c.is_whitespace() || c == ';')
            .next()
            .unwrap_or_default()
            .trim_end_matches(')');
        let absolute = sql.len() - after_eq.len();
        let found = token_value(sql, absolute, token, params);
        match found {
            Some(found) if found != tenant_id => {
                return Err(MediationError::CrossTenant {
                    table: table.to_string(),
                    found,
                });
            }
            _ => return Ok(Mediated::passthrough(sql)),
        }
    }

    // No tenant predicate: inject one ahead of any trailing clauses.
    let insert_at = trailing_clause_start(&lower);
    let has_where = find_keyword(&lower[..insert_at], "where").is_some();
    let connective = if has_where { "AND" } else { "WHERE" };

    let head = sql[..insert_at].trim_end();
    let tail = &sql[insert_at..];
    let rewritten = format!("{head} {connective} tenant_id = ?{}{tail}",
        if tail.is_empty() { "" } else { " " });

    tracing::trace!(table, "tenant predicate injected");
    Ok(Mediated {
        sql: rewritten.trim_end().to_string(),
        bind_tenant: true,
    })
}

/// Resolve the concrete value of a predicate/VALUES token, if determinable.
///
/// Quoted literals resolve directly; a `?` placeholder resolves through the
/// caller's bindings by counting placeholders to its left.
fn token_value(sql: &str, token_at: usize, token: &str, params: &[Value]) -> Option<String> {
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        return Some(token[1..token.len() - 1].to_string());
    }
    if token == "?" {
        let index = placeholders_before(sql, token_at);
        return match params.get(index) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
    }
    None
}

fn bound_value(
    sql: &str,
    values_open: usize,
    tokens: &[&str],
    position: usize,
    token: &str,
    params: &[Value],
) -> Option<String> {
    if token == "?" {
        // Placeholder index = placeholders before the VALUES tuple plus the
        // placeholders among earlier tuple entries.
        let before_tuple = placeholders_before(sql, values_open);
        let within = tokens[..position].iter().filter(|t| **t == "?").count();
        return match params.get(before_tuple + within) {
            Some(Value::String(s)) => Some(s.clone()),
            _ => None,
        };
    }
    token_value(sql, 0, token, params)
}

fn placeholders_before(sql: &str, position: usize) -> usize {
    let mut count = 0;
    let mut in_quotes = false;
    for (i, c) in sql.char_indices() {
        if i >= position {
            break;
        }
        match c {
            '\'' => in_quotes = !in_quotes,
            '?' if !in_quotes => count += 1,
            _ => {}
        }
    }
    count
}

/// Find a `tenant_id` reference used as a predicate (word boundary, outside
/// quotes, followed by `=`).
fn find_tenant_predicate(lower: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = lower[from..].find("tenant_id") {
        let idx = from + rel;
        let before_ok = idx == 0
            || !lower[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        let after = &lower[idx + "tenant_id".len()..];
        let follows_eq = after.trim_start().starts_with('=');
        let in_quotes = lower[..idx].matches('\'').count() % 2 == 1;
        if before_ok && follows_eq && !in_quotes {
            return Some(idx);
        }
        from = idx + "tenant_id".len();
    }
    None
}

/// Offset at which trailing clauses (GROUP BY / ORDER BY / LIMIT /
/// RETURNING) begin, or the end of the statement.
fn trailing_clause_start(lower: &str) -> usize {
    ["group by", "order by", "limit", "returning"]
        .iter()
        .filter_map(|kw| find_keyword(lower, kw))
        .min()
        .unwrap_or_else(|| lower.trim_end().trim_end_matches(';').len())
}

fn find_keyword(lower: &str, keyword: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = lower[from..].find(keyword) {
        let idx = from + rel;
        let before_ok = idx == 0
            || lower[..idx]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        let after = idx + keyword.len();
        let after_ok = after >= lower.len()
            || lower[after..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace);
        let in_quotes = lower[..idx].matches('\'').count() % 2 == 1;
        if before_ok && after_ok && !in_quotes {
            return Some(idx);
        }
        from = idx + keyword.len();
    }
    None
}

// ---------------------------------------------------------------------------
// ScopedDb
// ---------------------------------------------------------------------------

/// Errors surfaced by [`ScopedDb`].
#[derive(Debug, thiserror::Error)]
pub enum ScopedDbError {
    /// The mediator blocked or refused the statement.
    #[error(transparent)]
    Mediation(#[from] MediationError),

    /// The underlying database failed.
    #[error(transparent)]
    Db(#[from] DbError),
}

/// A [`Database`] wrapper that mediates every statement against the caller's
/// tenant context before execution.
#[derive(Clone)]
pub struct ScopedDb {
    inner: Arc<dyn Database>,
}

impl ScopedDb {
    /// Wrap a database.
    pub fn new(inner: Arc<dyn Database>) -> Self {
        Self { inner }
    }

    /// The unmediated database, for admin-marked statements only.
    #[must_use]
    pub fn raw(&self) -> Arc<dyn Database> {
        Arc::clone(&self.inner)
    }

    /// Mediated query.
    ///
    /// # Errors
    ///
    /// Mediation failures (including cross-tenant blocks) and database
    /// errors.
    pub async fn query(
        &self,
        ctx: &TenantContext,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<Row>, ScopedDbError> {
        let (sql, params) = self.prepare(ctx, sql, params)?;
        Ok(self.inner.query(&sql, &params).await?)
    }

    /// Mediated mutation.
    ///
    /// # Errors
    ///
    /// Mediation failures (including cross-tenant blocks) and database
    /// errors.
    pub async fn execute(
        &self,
        ctx: &TenantContext,
        sql: &str,
        params: &[Value],
    ) -> Result<u64, ScopedDbError> {
        let (sql, params) = self.prepare(ctx, sql, params)?;
        Ok(self.inner.execute(&sql, &params).await?)
    }

    fn prepare(
        &self,
        ctx: &TenantContext,
        sql: &str,
        params: &[Value],
    ) -> Result<(String, Vec<Value>), MediationError> {
        let mediated = mediate(&ctx.tenant_id, sql, params)?;
        let mut params = params.to_vec();
        if mediated.bind_tenant {
            params.push(Value::from(ctx.tenant_id.clone()));
        }
        Ok((mediated.sql, params))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- classification ---------------------------------------------------

    #[test]
    fn classifies_dml() {
        assert_eq!(classify("SELECT * FROM workflows"), StatementKind::Select);
        assert_eq!(
            classify("insert into users (id) values (?)"),
            StatementKind::Insert
        );
        assert_eq!(classify("UPDATE agents SET x = ?"), StatementKind::Update);
        assert_eq!(classify("DELETE FROM tools"), StatementKind::Delete);
    }

    #[test]
    fn skips_ddl_health_and_admin() {
        assert_eq!(
            classify("CREATE TABLE x (id TEXT)"),
            StatementKind::Skip(SkipReason::Ddl)
        );
        assert_eq!(
            classify("SELECT 1"),
            StatementKind::Skip(SkipReason::HealthPing)
        );
        assert_eq!(
            classify("-- admin\nSELECT * FROM workflows"),
            StatementKind::Skip(SkipReason::Admin)
        );
    }

    #[test]
    fn extracts_primary_table() {
        assert_eq!(
            primary_table("SELECT * FROM workflows WHERE id = ?", StatementKind::Select),
            Some("workflows".into())
        );
        assert_eq!(
            primary_table("INSERT INTO users (id) VALUES (?)", StatementKind::Insert),
            Some("users".into())
        );
        assert_eq!(
            primary_table("UPDATE agents SET s = ?", StatementKind::Update),
            Some("agents".into())
        );
        assert_eq!(
            primary_table("DELETE FROM tools WHERE id = ?", StatementKind::Delete),
            Some("tools".into())
        );
    }

    // -- injection --------------------------------------------------------

    #[test]
    fn select_without_predicate_gains_where() {
        let m = mediate("t1", "SELECT * FROM workflows", &[]).unwrap();
        assert_eq!(m.sql, "SELECT * FROM workflows WHERE tenant_id = ?");
        assert!(m.bind_tenant);
    }

    #[test]
    fn select_with_predicate_on_other_column_gains_and() {
        let m = mediate("t1", "SELECT * FROM workflows WHERE id = ?", &[json!("wf-1")]).unwrap();
        assert_eq!(
            m.sql,
            "SELECT * FROM workflows WHERE id = ? AND tenant_id = ?"
        );
        assert!(m.bind_tenant);
    }

    #[test]
    fn injection_lands_before_trailing_clauses() {
        let m = mediate(
            "t1",
            "SELECT * FROM workflows ORDER BY created_at LIMIT 10",
            &[],
        )
        .unwrap();
        assert_eq!(
            m.sql,
            "SELECT * FROM workflows WHERE tenant_id = ? ORDER BY created_at LIMIT 10"
        );
    }

    #[test]
    fn mutating_statement_without_where_is_rewritten() {
        let m = mediate("t1", "DELETE FROM agents", &[]).unwrap();
        assert_eq!(m.sql, "DELETE FROM agents WHERE tenant_id = ?");
        assert!(m.bind_tenant);

        let m = mediate("t1", "UPDATE tools SET name = ?", &[json!("x")]).unwrap();
        assert_eq!(m.sql, "UPDATE tools SET name = ? WHERE tenant_id = ?");
    }

    // -- verification -----------------------------------------------------

    #[test]
    fn matching_literal_predicate_passes() {
        let m = mediate(
            "t1",
            "SELECT * FROM workflows WHERE tenant_id = 't1'",
            &[],
        )
        .unwrap();
        assert!(!m.bind_tenant);
    }

    #[test]
    fn mismatched_literal_predicate_is_blocked() {
        let err = mediate(
            "t1",
            "SELECT * FROM workflows WHERE tenant_id = 't2'",
            &[],
        )
        .unwrap_err();
        match err {
            MediationError::CrossTenant { table, found } => {
                assert_eq!(table, "workflows");
                assert_eq!(found, "t2");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn mismatched_bound_predicate_is_blocked() {
        let err = mediate(
            "t1",
            "SELECT * FROM workflows WHERE tenant_id = ?",
            &[json!("t2")],
        )
        .unwrap_err();
        assert!(matches!(err, MediationError::CrossTenant { .. }));
    }

    #[test]
    fn matching_bound_predicate_passes() {
        let m = mediate(
            "t1",
            "SELECT * FROM workflows WHERE id = ? AND tenant_id = ?",
            &[json!("wf-1"), json!("t1")],
        )
        .unwrap();
        assert!(!m.bind_tenant);
    }

    // -- inserts ----------------------------------------------------------

    #[test]
    fn insert_missing_tenant_column_is_refused() {
        let err = mediate(
            "t1",
            "INSERT INTO users (id, email) VALUES (?, ?)",
            &[json!("u1"), json!("a@b.c")],
        )
        .unwrap_err();
        assert!(matches!(err, MediationError::MissingTenantColumn { .. }));
    }

    #[test]
    fn insert_with_matching_bound_tenant_passes() {
        let m = mediate(
            "t1",
            "INSERT INTO users (id, tenant_id, email) VALUES (?, ?, ?)",
            &[json!("u1"), json!("t1"), json!("a@b.c")],
        )
        .unwrap();
        assert!(!m.bind_tenant);
    }

    #[test]
    fn insert_with_foreign_tenant_is_blocked() {
        let err = mediate(
            "t1",
            "INSERT INTO users (id, tenant_id, email) VALUES (?, ?, ?)",
            &[json!("u1"), json!("t2"), json!("a@b.c")],
        )
        .unwrap_err();
        assert!(matches!(err, MediationError::CrossTenant { .. }));

        let err = mediate(
            "t1",
            "INSERT INTO users (id, tenant_id) VALUES (?, 't2')",
            &[json!("u1")],
        )
        .unwrap_err();
        assert!(matches!(err, MediationError::CrossTenant { .. }));
    }

    // -- catalog ----------------------------------------------------------

    #[test]
    fn unscoped_tables_pass_through() {
        let m = mediate("t1", "SELECT * FROM tenants", &[]).unwrap();
        assert_eq!(m.sql, "SELECT * FROM tenants");
        assert!(!m.bind_tenant);

        let m = mediate("t1", "SELECT * FROM plans WHERE workflow_id = ?", &[json!("wf")])
            .unwrap();
        assert!(!m.bind_tenant);
    }

    #[test]
    fn admin_marker_bypasses_scoping() {
        let m = mediate("t1", "-- admin\nSELECT * FROM workflows WHERE id = ?", &[json!("w")])
            .unwrap();
        assert!(!m.bind_tenant);
        assert!(m.sql.contains("-- admin"));
    }

    #[test]
    fn tenant_id_inside_string_literal_is_not_a_predicate() {
        let m = mediate(
            "t1",
            "SELECT * FROM workflows WHERE name = 'tenant_id = fake'",
            &[],
        )
        .unwrap();
        // The literal does not count; a real predicate is injected.
        assert!(m.bind_tenant);
        assert!(m.sql.ends_with("AND tenant_id = ?"));
    }

    // -- ScopedDb ---------------------------------------------------------

    #[tokio::test]
    async fn scoped_db_binds_the_context_tenant() {
        use af_store::MemoryDatabase;

        let db = Arc::new(MemoryDatabase::new());
        db.seed(
            "workflows",
            af_store::Row::from_iter([
                ("id".to_string(), json!("wf-1")),
                ("tenant_id".to_string(), json!("T1")),
            ]),
        )
        .await;
        db.seed(
            "workflows",
            af_store::Row::from_iter([
                ("id".to_string(), json!("wf-2")),
                ("tenant_id".to_string(), json!("T2")),
            ]),
        )
        .await;

        let scoped = ScopedDb::new(db.clone());
        let ctx = TenantContext::for_tenant("T1", "Tenant One");
        let rows = scoped
            .query(&ctx, "SELECT * FROM workflows", &[])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!("wf-1"));

        let log = db.statement_log().await;
        assert!(log[0].contains("WHERE tenant_id = 'T1'"));
    }

    #[tokio::test]
    async fn scoped_db_blocks_cross_tenant() {
        use af_store::MemoryDatabase;

        let db = Arc::new(MemoryDatabase::new());
        let scoped = ScopedDb::new(db);
        let ctx = TenantContext::for_tenant("T1", "Tenant One");
        let err = scoped
            .query(
                &ctx,
                "SELECT * FROM workflows WHERE tenant_id = 'T2'",
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ScopedDbError::Mediation(MediationError::CrossTenant { .. })
        ));
    }
}

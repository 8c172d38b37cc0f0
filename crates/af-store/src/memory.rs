// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-memory reference database.
//!
//! Understands exactly the statement shapes the repositories emit:
//!
//! - `INSERT INTO t (a, b) VALUES (?, ?)`
//! - `SELECT * FROM t [WHERE a = ? AND b = 'lit'] [ORDER BY c [DESC]] [LIMIT n]`
//! - `UPDATE t SET a = ?, b = ? [WHERE ...]`
//! - `DELETE FROM t [WHERE ...]`
//! - `SELECT 1` (health ping)
//!
//! `WHERE` supports equality predicates joined by `AND`, with either `?`
//! placeholders or single-quoted / numeric literals. Anything else returns
//! [`DbError::Unsupported`] rather than guessing. Every executed statement
//! is recorded (with bindings inlined) so tests can assert what reached the
//! storage layer.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::Mutex;

use crate::{Database, DbError, Row, render_statement};

/// In-memory table store with a statement log.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    log: Mutex<Vec<String>>,
}

impl MemoryDatabase {
    /// Create an empty database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement executed so far, with bindings inlined.
    pub async fn statement_log(&self) -> Vec<String> {
        self.log.lock().await.clone()
    }

    /// Insert a row directly, bypassing SQL (seeding helper for tests).
    pub async fn seed(&self, table: &str, row: Row) {
        let mut tables = self.tables.lock().await;
        tables.entry(table.to_string()).or_default().push(row);
    }

    /// Snapshot a table's rows (test helper).
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        let tables = self.tables.lock().await;
        tables.get(table).cloned().unwrap_or_default()
    }

    async fn record(&self, sql: &str, params: &[Value]) {
        self.log.lock().await.push(render_statement(sql, params));
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, DbError> {
        self.record(sql, params).await;
        let stmt = parse(sql, params)?;
        let mut tables = self.tables.lock().await;
        match stmt {
            Statement::Insert { table, columns, values } => {
                let mut row = Row::new();
                for (col, val) in columns.into_iter().zip(values) {
                    row.insert(col, val);
                }
                tables.entry(table).or_default().push(row);
                Ok(1)
            }
            Statement::Update { table, assignments, predicates } => {
                let rows = tables.entry(table).or_default();
                let mut affected = 0;
                for row in rows.iter_mut() {
                    if matches_all(row, &predicates) {
                        for (col, val) in &assignments {
                            row.insert(col.clone(), val.clone());
                        }
                        affected += 1;
                    }
                }
                Ok(affected)
            }
            Statement::Delete { table, predicates } => {
                let rows = tables.entry(table).or_default();
                let before = rows.len();
                rows.retain(|row| !matches_all(row, &predicates));
                Ok((before - rows.len()) as u64)
            }
            Statement::Select { .. } | Statement::Ping => Err(DbError::Malformed {
                reason: "queries must go through `query`".to_string(),
            }),
        }
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, DbError> {
        self.record(sql, params).await;
        let stmt = parse(sql, params)?;
        let tables = self.tables.lock().await;
        match stmt {
            Statement::Ping => {
                let mut row = Row::new();
                row.insert("1".to_string(), Value::from(1));
                Ok(vec![row])
            }
            Statement::Select { table, predicates, order_by, limit } => {
                let mut rows: Vec<Row> = tables
                    .get(&table)
                    .map(|rows| {
                        rows.iter()
                            .filter(|row| matches_all(row, &predicates))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some((col, descending)) = order_by {
                    rows.sort_by(|a, b| {
                        let av = a.get(&col).map(value_sort_key);
                        let bv = b.get(&col).map(value_sort_key);
                        let ord = av.cmp(&bv);
                        if descending { ord.reverse() } else { ord }
                    });
                }
                if let Some(n) = limit {
                    rows.truncate(n);
                }
                Ok(rows)
            }
            _ => Err(DbError::Malformed {
                reason: "mutations must go through `execute`".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Statement parsing (equality-only subset)
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Statement {
    Ping,
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Value>,
    },
    Select {
        table: String,
        predicates: Vec<(String, Value)>,
        order_by: Option<(String, bool)>,
        limit: Option<usize>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        predicates: Vec<(String, Value)>,
    },
    Delete {
        table: String,
        predicates: Vec<(String, Value)>,
    },
}

struct ParamCursor<'a> {
    params: &'a [Value],
    next: usize,
}

impl<'a> ParamCursor<'a> {
    fn take(&mut self) -> Result<Value, DbError> {
        let v = self.params.get(self.next).cloned().ok_or(DbError::Malformed {
            reason: format!("missing binding for placeholder #{}", self.next + 1),
        })?;
        self.next += 1;
        Ok(v)
    }
}

fn parse(sql: &str, params: &[Value]) -> Result<Statement, DbError> {
    // Strip line comments (the mediator's admin marker travels as one).
    let body: String = sql
        .lines()
        .filter(|l| !l.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join(" ");
    let trimmed = body.trim().trim_end_matches(';').trim();
    let lower = trimmed.to_lowercase();
    let mut cursor = ParamCursor { params, next: 0 };

    if lower == "select 1" {
        return Ok(Statement::Ping);
    }

    if let Some(rest) = strip_prefix_ci(trimmed, "insert into ") {
        return parse_insert(rest, &mut cursor);
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "select ") {
        return parse_select(rest, &mut cursor);
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "update ") {
        return parse_update(rest, &mut cursor);
    }
    if let Some(rest) = strip_prefix_ci(trimmed, "delete from ") {
        let (table, tail) = next_word(rest);
        let predicates = parse_where(tail, &mut cursor)?;
        return Ok(Statement::Delete {
            table: table.to_lowercase(),
            predicates,
        });
    }

    Err(DbError::Unsupported {
        reason: format!("statement shape not recognized: {}", truncate(trimmed)),
    })
}

fn parse_insert(rest: &str, cursor: &mut ParamCursor<'_>) -> Result<Statement, DbError> {
    let (table, tail) = next_word(rest);
    let open = tail.find('(').ok_or_else(|| DbError::Malformed {
        reason: "INSERT without column list".to_string(),
    })?;
    let close = tail[open..].find(')').ok_or_else(|| DbError::Malformed {
        reason: "unterminated column list".to_string(),
    })? + open;
    let columns: Vec<String> = tail[open + 1..close]
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .collect();

    let values_part = tail[close + 1..].trim();
    let values_part = strip_prefix_ci(values_part, "values").ok_or_else(|| DbError::Malformed {
        reason: "INSERT without VALUES".to_string(),
    })?;
    let vopen = values_part.find('(').ok_or_else(|| DbError::Malformed {
        reason: "VALUES without tuple".to_string(),
    })?;
    let vclose = values_part.rfind(')').ok_or_else(|| DbError::Malformed {
        reason: "unterminated VALUES tuple".to_string(),
    })?;
    let mut values = Vec::new();
    for token in values_part[vopen + 1..vclose].split(',') {
        values.push(parse_value_token(token.trim(), cursor)?);
    }
    if values.len() != columns.len() {
        return Err(DbError::Malformed {
            reason: format!(
                "column/value arity mismatch: {} vs {}",
                columns.len(),
                values.len()
            ),
        });
    }
    Ok(Statement::Insert {
        table: table.to_lowercase(),
        columns,
        values,
    })
}

fn parse_select(rest: &str, cursor: &mut ParamCursor<'_>) -> Result<Statement, DbError> {
    let from_idx = find_keyword(rest, "from").ok_or_else(|| DbError::Unsupported {
        reason: "SELECT without FROM".to_string(),
    })?;
    // Column projections are accepted but ignored; whole rows come back and
    // callers pick what they need.
    let after_from = &rest[from_idx + 4..];
    let (table, mut tail) = next_word(after_from.trim_start());

    let mut order_by = None;
    let mut limit = None;

    if let Some(idx) = find_keyword(tail, "limit") {
        let n = tail[idx + 5..].trim();
        limit = Some(n.parse().map_err(|_| DbError::Malformed {
            reason: format!("bad LIMIT '{n}'"),
        })?);
        tail = &tail[..idx];
    }
    if let Some(idx) = find_keyword(tail, "order by") {
        let clause = tail[idx + 8..].trim();
        let descending = clause.to_lowercase().ends_with(" desc");
        let col = clause
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_lowercase();
        order_by = Some((col, descending));
        tail = &tail[..idx];
    }

    let predicates = parse_where(tail, cursor)?;
    Ok(Statement::Select {
        table: table.to_lowercase(),
        predicates,
        order_by,
        limit,
    })
}

fn parse_update(rest: &str, cursor: &mut ParamCursor<'_>) -> Result<Statement, DbError> {
    let (table, tail) = next_word(rest);
    let tail = tail.trim_start();
    let tail = strip_prefix_ci(tail, "set ").ok_or_else(|| DbError::Malformed {
        reason: "UPDATE without SET".to_string(),
    })?;

    let (set_part, where_part) = match find_keyword(tail, "where") {
        Some(idx) => (&tail[..idx], &tail[idx..]),
        None => (tail, ""),
    };

    let mut assignments = Vec::new();
    for clause in set_part.split(',') {
        let (col, value) = parse_equality(clause.trim(), cursor)?;
        assignments.push((col, value));
    }
    let predicates = parse_where(where_part, cursor)?;
    Ok(Statement::Update {
        table: table.to_lowercase(),
        assignments,
        predicates,
    })
}

fn parse_where(
    tail: &str,
    cursor: &mut ParamCursor<'_>,
) -> Result<Vec<(String, Value)>, DbError> {
    let tail = tail.trim();
    if tail.is_empty() {
        return Ok(Vec::new());
    }
    let clause = strip_prefix_ci(tail, "where ").ok_or_else(|| DbError::Unsupported {
        reason: format!("unrecognized trailing clause: {}", truncate(tail)),
    })?;
    let mut predicates = Vec::new();
    for part in split_keyword(clause, "and") {
        predicates.push(parse_equality(part.trim(), cursor)?);
    }
    Ok(predicates)
}

fn parse_equality(
    clause: &str,
    cursor: &mut ParamCursor<'_>,
) -> Result<(String, Value), DbError> {
    let eq = clause.find('=').ok_or_else(|| DbError::Unsupported {
        reason: format!("only equality predicates are supported: {}", truncate(clause)),
    })?;
    let col = clause[..eq].trim().to_lowercase();
    let value = parse_value_token(clause[eq + 1..].trim(), cursor)?;
    Ok((col, value))
}

fn parse_value_token(token: &str, cursor: &mut ParamCursor<'_>) -> Result<Value, DbError> {
    if token == "?" {
        return cursor.take();
    }
    if token.len() >= 2 && token.starts_with('\'') && token.ends_with('\'') {
        return Ok(Value::from(&token[1..token.len() - 1]));
    }
    if token.eq_ignore_ascii_case("null") {
        return Ok(Value::Null);
    }
    if token.eq_ignore_ascii_case("true") {
        return Ok(Value::from(true));
    }
    if token.eq_ignore_ascii_case("false") {
        return Ok(Value::from(false));
    }
    if let Ok(n) = token.parse::<i64>() {
        return Ok(Value::from(n));
    }
    if let Ok(f) = token.parse::<f64>() {
        return Ok(Value::from(f));
    }
    Err(DbError::Unsupported {
        reason: format!("unrecognized value token '{token}'"),
    })
}

fn matches_all(row: &Row, predicates: &[(String, Value)]) -> bool {
    predicates
        .iter()
        .all(|(col, expected)| row.get(col) == Some(expected))
}

fn value_sort_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

fn next_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(idx) => (&s[..idx], &s[idx..]),
        None => (s, ""),
    }
}

/// Find a keyword at a word boundary, case-insensitive, outside quotes.
fn find_keyword(haystack: &str, keyword: &str) -> Option<usize> {
    let lower = haystack.to_lowercase();
    let needle = keyword.to_lowercase();
    let mut search_from = 0;
    while let Some(rel) = lower[search_from..].find(&needle) {
        let idx = search_from + rel;
        let before_ok = idx == 0
            || lower[..idx]
                .chars()
                .next_back()
                .is_some_and(char::is_whitespace);
        let after = idx + needle.len();
        let after_ok = after >= lower.len()
            || lower[after..].chars().next().is_some_and(char::is_whitespace);
        let in_quotes = haystack[..idx].matches('\'').count() % 2 == 1;
        if before_ok && after_ok && !in_quotes {
            return Some(idx);
        }
        search_from = idx + needle.len();
    }
    None
}

/// Split on a keyword at word boundaries (e.g. `AND`), outside quotes.
fn split_keyword<'a>(s: &'a str, keyword: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut start = 0;
    while let Some(rel) = find_keyword(&s[start..], keyword) {
        let abs = start + rel;
        parts.push(&s[start..abs]);
        start = abs + keyword.len();
    }
    parts.push(&s[start..]);
    parts
}

fn truncate(s: &str) -> String {
    if s.len() > 64 {
        format!("{}…", &s[..64])
    } else {
        s.to_string()
    }
}

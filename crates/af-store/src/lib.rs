// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-store
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// In-memory reference database.
pub mod memory;
/// Typed records for the control-plane tables.
pub mod records;

use async_trait::async_trait;
use std::collections::BTreeMap;

pub use memory::MemoryDatabase;

/// A result row: column name → JSON value, deterministically ordered.
pub type Row = BTreeMap<String, serde_json::Value>;

/// Errors from database access.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The statement uses syntax outside the supported subset.
    #[error("unsupported statement: {reason}")]
    Unsupported {
        /// What was not understood.
        reason: String,
    },

    /// The statement is malformed (bad clause, param-count mismatch).
    #[error("malformed statement: {reason}")]
    Malformed {
        /// What is wrong.
        reason: String,
    },

    /// The store could not be reached.
    #[error("database unavailable: {reason}")]
    Unavailable {
        /// Human-readable failure detail.
        reason: String,
    },
}

/// Parameterized SQL access. Every caller goes through the tenant-scoped
/// mediator before reaching an implementation of this trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run a mutating statement; returns the number of affected rows.
    async fn execute(&self, sql: &str, params: &[serde_json::Value]) -> Result<u64, DbError>;

    /// Run a query; returns matching rows.
    async fn query(&self, sql: &str, params: &[serde_json::Value]) -> Result<Vec<Row>, DbError>;
}

/// Render a parameterized statement with its bindings inlined, for
/// diagnostics and statement logs only — never executed.
#[must_use]
pub fn render_statement(sql: &str, params: &[serde_json::Value]) -> String {
    let mut out = String::with_capacity(sql.len() + params.len() * 8);
    let mut next = 0usize;
    for ch in sql.chars() {
        if ch == '?' {
            match params.get(next) {
                Some(serde_json::Value::String(s)) => {
                    out.push('\'');
                    out.push_str(s);
                    out.push('\'');
                }
                Some(v) => out.push_str(&v.to_string()),
                None => out.push('?'),
            }
            next += 1;
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_inlines_strings_quoted() {
        let sql = "SELECT * FROM workflows WHERE id = ? AND tenant_id = ?";
        let rendered = render_statement(sql, &[json!("wf-1"), json!("T1")]);
        assert_eq!(
            rendered,
            "SELECT * FROM workflows WHERE id = 'wf-1' AND tenant_id = 'T1'"
        );
    }

    #[test]
    fn render_inlines_numbers_bare() {
        let rendered = render_statement("UPDATE budgets SET amount = ?", &[json!(12.5)]);
        assert_eq!(rendered, "UPDATE budgets SET amount = 12.5");
    }

    #[test]
    fn render_leaves_unbound_placeholders() {
        let rendered = render_statement("a = ? AND b = ?", &[json!(1)]);
        assert_eq!(rendered, "a = 1 AND b = ?");
    }
}

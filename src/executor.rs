//! Query execution collaborator.
//!
//! Some rules need the database's opinion of a statement (`EXPLAIN`). The
//! engine does not talk to databases itself; embedders implement
//! [`QueryExecutor`] and pass it in the review context. The executor is
//! called synchronously with an [`ExecContext`] that carries an optional
//! deadline and a cancellation flag.
//!
//! [`StaticExecutor`] answers from canned results and is used for tests and
//! offline checks.
//!
//! # Example
//!
//! ```
//! use sql_advisor::executor::{ExecContext, QueryExecutor, QueryRows, StaticExecutor, explain};
//!
//! let rows = QueryRows::explain(&[("t", "ALL", 5000, "Using where")]);
//! let executor = StaticExecutor::new().with_result("EXPLAIN SELECT * FROM t", rows);
//! let plan = explain(&executor, &ExecContext::new(), "SELECT * FROM t").unwrap();
//! assert_eq!(plan[0].access_type, "ALL");
//! assert_eq!(plan[0].rows, 5000);
//! ```

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering}
    },
    time::{Duration, Instant}
};

use crate::error::{AppResult, executor_error};

/// Column names of MySQL's `EXPLAIN` output.
pub const EXPLAIN_COLUMNS: [&str; 12] = [
    "id",
    "select_type",
    "table",
    "partitions",
    "type",
    "possible_keys",
    "key",
    "key_len",
    "ref",
    "rows",
    "filtered",
    "Extra"
];

const TYPE_COLUMN: usize = 4;
const ROWS_COLUMN: usize = 9;
const EXTRA_COLUMN: usize = 11;

/// Deadline and cancellation for executor calls.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    deadline:  Option<Instant>,
    cancelled: Arc<AtomicBool>
}

impl ExecContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline:  Some(Instant::now() + timeout),
            cancelled: Arc::default()
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Shared flag; setting it cancels every clone of this context.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Fail if the context is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns a service error naming the reason.
    pub fn check(&self) -> AppResult<()> {
        if self.is_cancelled() {
            return Err(executor_error("query execution cancelled"));
        }
        if self.is_expired() {
            return Err(executor_error("query execution deadline exceeded"));
        }
        Ok(())
    }
}

/// Tabular query result. `None` cells are SQL NULL.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows:    Vec<Vec<Option<String>>>
}

impl QueryRows {
    /// Build a 12-column `EXPLAIN` result from `(table, type, rows, Extra)`
    /// tuples.
    pub fn explain(rows: &[(&str, &str, i64, &str)]) -> Self {
        Self {
            columns: EXPLAIN_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows:    rows
                .iter()
                .enumerate()
                .map(|(i, (table, access, count, extra))| {
                    vec![
                        Some((i + 1).to_string()),
                        Some("SIMPLE".to_string()),
                        Some(table.to_string()),
                        None,
                        Some(access.to_string()),
                        None,
                        None,
                        None,
                        None,
                        Some(count.to_string()),
                        Some("100.00".to_string()),
                        Some(extra.to_string())
                    ]
                })
                .collect()
        }
    }
}

/// Runs SQL against a database.
pub trait QueryExecutor: Send + Sync {
    /// Execute `sql` and return all rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the context is no longer
    /// valid.
    fn query(&self, ctx: &ExecContext, sql: &str) -> AppResult<QueryRows>;
}

/// In-memory executor answering from canned results keyed by SQL text.
#[derive(Debug, Clone, Default)]
pub struct StaticExecutor {
    results:  HashMap<String, QueryRows>,
    failures: HashMap<String, String>,
    fallback: Option<QueryRows>
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_end_matches(';')
        .to_uppercase()
}

impl StaticExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_result(mut self, sql: &str, rows: QueryRows) -> Self {
        self.results.insert(normalize(sql), rows);
        self
    }

    pub fn with_failure(mut self, sql: &str, message: impl Into<String>) -> Self {
        self.failures.insert(normalize(sql), message.into());
        self
    }

    /// Result returned for queries without a canned answer.
    pub fn with_fallback(mut self, rows: QueryRows) -> Self {
        self.fallback = Some(rows);
        self
    }
}

impl QueryExecutor for StaticExecutor {
    fn query(&self, ctx: &ExecContext, sql: &str) -> AppResult<QueryRows> {
        ctx.check()?;
        let key = normalize(sql);
        if let Some(message) = self.failures.get(&key) {
            return Err(executor_error(message.clone()));
        }
        self.results
            .get(&key)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| executor_error(format!("no result for query: {}", sql)))
    }
}

/// One row of an `EXPLAIN` plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplainRow {
    pub table:       Option<String>,
    /// Access type (`ALL` is a full scan)
    pub access_type: String,
    /// Estimated rows examined
    pub rows:        i64,
    pub extra:       String
}

impl ExplainRow {
    pub fn is_full_scan(&self) -> bool {
        self.access_type.eq_ignore_ascii_case("ALL")
    }

    pub fn uses_filesort(&self) -> bool {
        self.extra.contains("Using filesort")
    }

    pub fn uses_temporary(&self) -> bool {
        self.extra.contains("Using temporary")
    }
}

/// Run `EXPLAIN <sql>` and read the MySQL plan shape.
///
/// # Errors
///
/// Returns an error if the context is invalid, the executor fails, or the
/// result does not have the 12 expected columns.
pub fn explain(
    executor: &dyn QueryExecutor,
    ctx: &ExecContext,
    sql: &str
) -> AppResult<Vec<ExplainRow>> {
    ctx.check()?;
    let result = executor.query(ctx, &format!("EXPLAIN {}", sql))?;
    if result.columns.len() != EXPLAIN_COLUMNS.len() {
        return Err(executor_error(format!(
            "unexpected EXPLAIN result: expected {} columns, got {}",
            EXPLAIN_COLUMNS.len(),
            result.columns.len()
        )));
    }
    result
        .rows
        .iter()
        .map(|row| {
            if row.len() != EXPLAIN_COLUMNS.len() {
                return Err(executor_error("EXPLAIN row has wrong number of cells"));
            }
            let cell = |i: usize| row[i].clone().unwrap_or_default();
            let rows = match &row[ROWS_COLUMN] {
                Some(text) => text
                    .parse()
                    .map_err(|_| executor_error(format!("invalid EXPLAIN rows value: {}", text)))?,
                None => 0
            };
            Ok(ExplainRow {
                table: row[2].clone(),
                access_type: cell(TYPE_COLUMN),
                rows,
                extra: cell(EXTRA_COLUMN)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_context_fails() {
        let ctx = ExecContext::new();
        ctx.cancel_flag().store(true, Ordering::SeqCst);
        let executor = StaticExecutor::new().with_fallback(QueryRows::default());
        assert!(executor.query(&ctx, "SELECT 1").is_err());
    }

    #[test]
    fn test_expired_deadline_fails() {
        let ctx = ExecContext::new().with_deadline(Instant::now() - Duration::from_secs(1));
        assert!(ctx.is_expired());
        assert!(ctx.check().is_err());
    }

    #[test]
    fn test_explain_rejects_wrong_shape() {
        let rows = QueryRows {
            columns: vec!["id".into()],
            rows:    vec![vec![Some("1".into())]]
        };
        let executor = StaticExecutor::new().with_fallback(rows);
        assert!(explain(&executor, &ExecContext::new(), "SELECT 1").is_err());
    }

    #[test]
    fn test_explain_flags() {
        let executor = StaticExecutor::new().with_fallback(QueryRows::explain(&[(
            "t",
            "ALL",
            10,
            "Using where; Using temporary; Using filesort"
        )]));
        let plan = explain(&executor, &ExecContext::new(), "SELECT a FROM t ORDER BY b").unwrap();
        assert!(plan[0].is_full_scan());
        assert!(plan[0].uses_filesort());
        assert!(plan[0].uses_temporary());
    }

    #[test]
    fn test_lookup_ignores_whitespace_and_case() {
        let executor = StaticExecutor::new().with_result("explain  select 1", QueryRows::default());
        assert!(executor.query(&ExecContext::new(), "EXPLAIN SELECT 1;").is_ok());
    }
}

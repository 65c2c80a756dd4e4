//! In-memory executor answering queries from a script.
//!
//! Each rule matches on a substring of the SQL text; the first matching rule
//! answers. A rule holding several responses hands them out in order and then
//! keeps repeating the last one. Every executed statement is recorded.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{EngineError, QueryExecutor, QueryResult, SqlValue};

type Response = Result<QueryResult, EngineError>;

struct Rule {
    needle: String,
    responses: VecDeque<Response>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedQuery {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Mutex<Vec<Rule>>,
    executed: Mutex<Vec<ExecutedQuery>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every query containing `needle` with `result`.
    pub fn respond(self, needle: &str, result: QueryResult) -> Self {
        self.respond_sequence(needle, vec![Ok(result)])
    }

    /// Fail every query containing `needle`.
    pub fn fail(self, needle: &str, message: &str) -> Self {
        self.respond_sequence(needle, vec![Err(EngineError::query("executing", message))])
    }

    /// Answer queries containing `needle` with `responses` in order.
    pub fn respond_sequence(self, needle: &str, responses: Vec<Response>) -> Self {
        self.lock_rules().push(Rule {
            needle: needle.to_string(),
            responses: responses.into(),
        });
        self
    }

    pub fn executed(&self) -> Vec<ExecutedQuery> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Executed statements whose SQL contains `needle`.
    pub fn executed_matching(&self, needle: &str) -> Vec<ExecutedQuery> {
        self.executed()
            .into_iter()
            .filter(|q| q.sql.contains(needle))
            .collect()
    }

    fn lock_rules(&self) -> std::sync::MutexGuard<'_, Vec<Rule>> {
        self.rules.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, EngineError> {
        self.executed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ExecutedQuery {
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        let mut rules = self.lock_rules();
        let Some(rule) = rules.iter_mut().find(|r| sql.contains(&r.needle)) else {
            return Err(EngineError::query(
                "executing",
                format!("no scripted response for query: {}", sql),
            ));
        };
        if rule.responses.len() > 1 {
            if let Some(next) = rule.responses.pop_front() {
                return next;
            }
        }
        rule.responses
            .front()
            .cloned()
            .unwrap_or_else(|| Ok(QueryResult::default()))
    }
}

/// Build a [`QueryResult`] from column names and rows.
pub fn result_of(columns: &[&str], rows: Vec<Vec<SqlValue>>) -> QueryResult {
    QueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
    }
}

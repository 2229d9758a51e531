use async_trait::async_trait;
use std::sync::Mutex;
use tributary_catalog::{ComputeEngine, ComputeError, Row};

#[derive(Default)]
struct State {
    executed: Vec<(String, String)>,
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<(String, String)>,
}

/// Compute engine that records statements and answers from canned rows.
///
/// Statements with no canned response return no rows.
#[derive(Default)]
pub struct FakeComputeEngine {
    state: Mutex<State>,
}

impl FakeComputeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer statements starting with `prefix` with `rows`.
    pub fn respond_to(&self, prefix: impl Into<String>, rows: Vec<Row>) {
        self.state().responses.push((prefix.into(), rows));
    }

    /// Fail statements containing `fragment`.
    pub fn fail_when(&self, fragment: impl Into<String>, message: impl Into<String>) {
        self.state().failures.push((fragment.into(), message.into()));
    }

    /// `(database, statement)` pairs in execution order.
    pub fn executed(&self) -> Vec<(String, String)> {
        self.state().executed.clone()
    }

    pub fn statements(&self) -> Vec<String> {
        self.executed().into_iter().map(|(_, s)| s).collect()
    }
}

#[async_trait]
impl ComputeEngine for FakeComputeEngine {
    async fn execute(&self, database: &str, statement: &str) -> Result<Vec<Row>, ComputeError> {
        let mut state = self.state();
        state
            .executed
            .push((database.to_string(), statement.to_string()));

        if let Some((_, message)) = state
            .failures
            .iter()
            .find(|(fragment, _)| statement.contains(fragment.as_str()))
        {
            return Err(ComputeError::Statement {
                statement: statement.to_string(),
                message: message.clone(),
            });
        }

        Ok(state
            .responses
            .iter()
            .find(|(prefix, _)| statement.starts_with(prefix.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }
}

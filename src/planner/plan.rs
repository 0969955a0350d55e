use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::executor::engine::{ExecutionContext, Executor};
use crate::graph::search::WeightedPath;
use crate::state::{AbstractState, Variables};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterType {
    String,
}

/// A runtime value the caller has to supply before a plan can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub description: String,
    pub value_type: ParameterType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required_string(key: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: description.into(),
            value_type: ParameterType::String,
            required: true,
            default: None,
        }
    }
}

/// A resolved, parameter-annotated path for one function.
#[derive(Clone)]
pub struct Plan {
    id: Uuid,
    function_name: String,
    path: WeightedPath,
    parameters: Vec<Parameter>,
    executor: Arc<Executor>,
}

impl std::fmt::Debug for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("function_name", &self.function_name)
            .field("path", &self.path)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

impl Plan {
    pub fn new(
        function_name: impl Into<String>,
        path: WeightedPath,
        parameters: Vec<Parameter>,
        executor: Arc<Executor>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            function_name: function_name.into(),
            path,
            parameters,
            executor,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn path(&self) -> &WeightedPath {
        &self.path
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Required keys absent from `values` that have no default.
    pub fn missing_parameters(&self, values: &Variables) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|p| p.required && p.default.is_none() && !values.contains_key(&p.key))
            .map(|p| p.key.clone())
            .collect()
    }

    /// Runs the plan. Fails before touching the device when a required
    /// parameter is missing.
    pub async fn execute(&self, values: Variables) -> ExecutionResult {
        let started_at = Utc::now();
        let missing = self.missing_parameters(&values);
        if !missing.is_empty() {
            tracing::warn!(plan = %self.id, ?missing, "refusing to execute, parameters missing");
            return ExecutionResult::failure(
                format!("missing required parameters: {}", missing.join(", ")),
                self.path.start().cloned(),
                started_at,
            );
        }

        let mut variables = values;
        for parameter in &self.parameters {
            if let Some(default) = &parameter.default {
                variables
                    .entry(parameter.key.clone())
                    .or_insert_with(|| default.clone());
            }
        }

        let context = ExecutionContext {
            variables,
            current_state: None,
        };
        let run = self.executor.execute_path(&self.path, context);
        match AssertUnwindSafe(run).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(plan = %self.id, "execution panicked");
                ExecutionResult::failure(
                    "execution aborted by an internal fault",
                    None,
                    started_at,
                )
            }
        }
    }
}

/// Outcome of executing a plan.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub run_id: Uuid,
    pub success: bool,
    pub message: String,
    pub error: Option<String>,
    /// Final state on success, last known state on failure.
    pub final_state: Option<AbstractState>,
    pub path: Option<WeightedPath>,
    /// Operations that were passed over without real dispatch.
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(
        message: impl Into<String>,
        final_state: AbstractState,
        path: WeightedPath,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            success: true,
            message: message.into(),
            error: None,
            final_state: Some(final_state),
            path: Some(path),
            warnings: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failure(
        error: impl Into<String>,
        last_state: Option<AbstractState>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let error = error.into();
        Self {
            run_id: Uuid::new_v4(),
            success: false,
            message: error.clone(),
            error: Some(error),
            final_state: last_state,
            path: None,
            warnings: Vec::new(),
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }
}

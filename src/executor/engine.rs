use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::config::{TimingConfig, VerificationMode};
use crate::device::backend::DeviceSession;
use crate::errors::ScreenFlowResult;
use crate::executor::dispatcher::Dispatcher;
use crate::executor::journal::{JournalEntry, RunJournal, StepOutcome};
use crate::executor::template::substitute;
use crate::graph::model::ScreenGraph;
use crate::graph::search::{PathEdge, WeightedPath};
use crate::planner::plan::ExecutionResult;
use crate::state::{AbstractState, Variables};

/// Per-run inputs to [`Executor::execute_path`].
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: Variables,
    /// Overrides the path's first state as the starting point.
    pub current_state: Option<AbstractState>,
}

/// Reads the foreground screen and names it against `graph`.
pub async fn observe(session: &DeviceSession, graph: &ScreenGraph) -> ScreenFlowResult<AbstractState> {
    let page = session.page_info().await?;
    let node = graph.identify(
        &page.package_name,
        page.activity_name.as_deref(),
        page.ui_tree.as_ref(),
    );
    let mut state = AbstractState::new(node, Some(page.package_name), page.activity_name);
    state.ui_tree = page.ui_tree;
    Ok(state)
}

/// Walks a planned path edge by edge against the live device.
///
/// Each edge is template-filled, dispatched, given time to settle and then
/// verified by re-reading the screen. Verification that never succeeds is
/// not an error: the walk advances optimistically to the declared target.
pub struct Executor {
    session: Arc<DeviceSession>,
    graph: Arc<ScreenGraph>,
    timing: TimingConfig,
    journal_dir: Option<PathBuf>,
}

struct Verification {
    observed: Option<AbstractState>,
    last_reading: Option<AbstractState>,
    attempts: u32,
}

impl Executor {
    pub fn new(session: Arc<DeviceSession>, graph: Arc<ScreenGraph>, timing: TimingConfig) -> Self {
        Self {
            session,
            graph,
            timing,
            journal_dir: None,
        }
    }

    /// Writes a JSONL journal of every run into `directory`.
    pub fn with_journal(mut self, directory: PathBuf) -> Self {
        self.journal_dir = Some(directory);
        self
    }

    pub fn graph(&self) -> &ScreenGraph {
        &self.graph
    }

    pub async fn read_state(&self) -> ScreenFlowResult<AbstractState> {
        observe(&self.session, &self.graph).await
    }

    pub async fn execute_path(&self, path: &WeightedPath, context: ExecutionContext) -> ExecutionResult {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let Some(start) = context.current_state.or_else(|| path.start().cloned()) else {
            tracing::warn!(run = %run_id, "path has no states, nothing to execute");
            return ExecutionResult::failure("path has no starting state", None, started_at).with_run_id(run_id);
        };
        let journal = match self.journal_dir.as_deref() {
            Some(dir) => Some(RunJournal::new(run_id, dir).await),
            None => None,
        };
        let dispatcher = Dispatcher::new(&self.session, &self.timing);

        let mut running = start.with_variables(&context.variables);
        let mut skipped: Vec<String> = Vec::new();

        tracing::info!(
            run = %run_id,
            steps = path.edges.len(),
            start = running.node_id(),
            "execution started"
        );

        for (step, edge) in path.edges.iter().enumerate() {
            let operation = substitute(&edge.operation, running.variables());
            tracing::info!(
                run = %run_id,
                step,
                from = %edge.from,
                to = %edge.to,
                kind = operation.kind(),
                synthetic = edge.synthetic,
                "executing edge"
            );

            if let Err(e) = dispatcher.dispatch(&operation, &running, &mut skipped).await {
                let message = format!("{} -> {}: {e}", edge.from, edge.to);
                tracing::warn!(run = %run_id, step, error = %e, "edge dispatch failed, aborting");
                record(&journal, run_id, step, edge, StepOutcome::DispatchFailed, None).await;
                return ExecutionResult::failure(message.clone(), Some(running.with_error(message)), started_at)
                    .with_warnings(skipped)
                    .with_run_id(run_id);
            }

            tokio::time::sleep(self.timing.settle_delay()).await;

            let planned = path.states.get(step + 1);
            let verification = self.verify(&running, edge, planned).await;
            let carried = carry_planned(&running, planned);
            let (mut next, outcome) = match verification.observed {
                Some(observed) => (self.merge_observed(&carried, observed, &edge.to), StepOutcome::Verified),
                None => {
                    tracing::warn!(
                        run = %run_id,
                        step,
                        to = %edge.to,
                        attempts = verification.attempts,
                        "verification exhausted, advancing optimistically"
                    );
                    let mut advanced = self.graph.graph().enter(&carried, &edge.to);
                    advanced.ui_tree = verification.last_reading.and_then(|s| s.ui_tree);
                    (advanced, StepOutcome::Optimistic)
                }
            };
            next.retry_count = verification.attempts.saturating_sub(1);

            if let Some(validation) = &edge.validation {
                let validation = substitute(validation, next.variables());
                if let Err(e) = dispatcher.dispatch(&validation, &next, &mut skipped).await {
                    let message = format!("validation after {} -> {} failed: {e}", edge.from, edge.to);
                    tracing::warn!(run = %run_id, step, error = %e, "edge validation failed, aborting");
                    record(&journal, run_id, step, edge, StepOutcome::ValidationFailed, Some(next.node_id())).await;
                    return ExecutionResult::failure(message.clone(), Some(next.with_error(message)), started_at)
                        .with_warnings(skipped)
                        .with_run_id(run_id);
                }
            }

            record(&journal, run_id, step, edge, outcome, Some(next.node_id())).await;
            running = next;
        }

        tracing::info!(run = %run_id, node = running.node_id(), skipped = skipped.len(), "execution finished");
        let message = format!("reached {}", running.node_id());
        ExecutionResult::success(message, running, path.clone(), started_at)
            .with_warnings(skipped)
            .with_run_id(run_id)
    }

    /// Re-reads the screen until it satisfies the configured mode or the
    /// retry budget runs out.
    async fn verify(
        &self,
        before: &AbstractState,
        edge: &PathEdge,
        planned: Option<&AbstractState>,
    ) -> Verification {
        let retries = self.timing.verification_retries.max(1);
        let mut last_reading = None;
        for attempt in 1..=retries {
            match self.read_state().await {
                Ok(observed) => {
                    if self.accepts(before, edge, planned, &observed) {
                        return Verification {
                            observed: Some(observed),
                            last_reading: None,
                            attempts: attempt,
                        };
                    }
                    tracing::debug!(
                        attempt,
                        observed = observed.node_id(),
                        expected = %edge.to,
                        "screen not verified yet"
                    );
                    last_reading = Some(observed);
                }
                Err(e) => tracing::debug!(attempt, error = %e, "screen read failed during verification"),
            }
            if attempt < retries {
                tokio::time::sleep(self.timing.verification_backoff()).await;
            }
        }
        Verification {
            observed: None,
            last_reading,
            attempts: retries,
        }
    }

    fn accepts(
        &self,
        before: &AbstractState,
        edge: &PathEdge,
        planned: Option<&AbstractState>,
        observed: &AbstractState,
    ) -> bool {
        match self.timing.verification {
            VerificationMode::Unchanged => observed.same_screen(before),
            VerificationMode::Expected => planned.is_some_and(|p| {
                observed.package_name == p.package_name && observed.node_id() == p.node_id()
            }),
            VerificationMode::Strict => {
                observed.node_id() == edge.to
                    && planned.map_or(true, |p| observed.package_name == p.package_name)
            }
        }
    }

    /// Observed state with variables layered: declared on `node`, then
    /// carried from `running`, then observed.
    fn merge_observed(&self, running: &AbstractState, observed: AbstractState, node: &str) -> AbstractState {
        let mut variables = self
            .graph
            .node(node)
            .map(|n| n.variables.clone())
            .unwrap_or_default();
        variables.extend(running.variables().iter().map(|(k, v)| (k.clone(), v.clone())));
        variables.extend(observed.state.variables.clone());
        let mut next = observed;
        next.state.variables = variables;
        next
    }
}

/// `running` with the variables the plan expected after this step layered
/// underneath its own.
fn carry_planned(running: &AbstractState, planned: Option<&AbstractState>) -> AbstractState {
    let Some(planned) = planned else {
        return running.clone();
    };
    let mut carried = running.clone();
    carried.state.variables = planned.variables().clone();
    carried
        .state
        .variables
        .extend(running.variables().iter().map(|(k, v)| (k.clone(), v.clone())));
    carried
}

async fn record(
    journal: &Option<RunJournal>,
    run_id: Uuid,
    step: usize,
    edge: &PathEdge,
    outcome: StepOutcome,
    observed_node: Option<&str>,
) {
    if let Some(journal) = journal {
        journal.record(JournalEntry {
            run_id,
            ts: Utc::now().timestamp_millis(),
            step,
            from: edge.from.clone(),
            to: edge.to.clone(),
            operation: edge.operation.kind().to_string(),
            outcome,
            observed_node: observed_node.map(str::to_string),
        })
        .await;
    }
}

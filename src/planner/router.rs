use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use futures_util::FutureExt;

use crate::config::{AppConfig, TimingConfig};
use crate::device::backend::DeviceSession;
use crate::errors::{PlanError, ScreenFlowResult};
use crate::executor::engine::{observe, Executor};
use crate::executor::journal::default_journal_dir;
use crate::graph::document::ConfigDocument;
use crate::graph::model::{LoadReport, ScreenGraph};
use crate::graph::operation::Operation;
use crate::graph::search::PathEdge;
use crate::planner::params::extract_parameters;
use crate::planner::plan::Plan;
use crate::state::{AbstractState, Variables};

/// Weight of the launch edge spliced in front of a cross-application route.
pub const LAUNCH_EDGE_WEIGHT: f64 = 1.0;
/// Weight of the edge that runs a function's own operation.
pub const TERMINAL_EDGE_WEIGHT: f64 = 0.0;

/// Owns the current screen-graph snapshot and turns function names into plans.
///
/// Loading swaps in a new snapshot atomically; plans keep the snapshot they
/// were built from.
pub struct Router {
    graph: ArcSwap<ScreenGraph>,
    session: Arc<DeviceSession>,
    timing: TimingConfig,
    journal_dir: Option<PathBuf>,
}

impl Router {
    pub fn new(session: Arc<DeviceSession>, timing: TimingConfig) -> Self {
        Self {
            graph: ArcSwap::from_pointee(ScreenGraph::default()),
            session,
            timing,
            journal_dir: None,
        }
    }

    pub fn from_config(session: Arc<DeviceSession>, config: &AppConfig) -> Self {
        let router = Self::new(session, config.timing.clone());
        if config.journal.enabled {
            let dir = config
                .journal
                .directory
                .clone()
                .unwrap_or_else(default_journal_dir);
            return router.with_journal(dir);
        }
        router
    }

    pub fn with_journal(mut self, directory: PathBuf) -> Self {
        self.journal_dir = Some(directory);
        self
    }

    pub fn snapshot(&self) -> Arc<ScreenGraph> {
        self.graph.load_full()
    }

    /// Loads `doc` into a new snapshot and publishes it.
    pub fn load_config(&self, doc: &ConfigDocument, merge: bool) -> LoadReport {
        let mut report = LoadReport::default();
        self.graph.rcu(|current| {
            let (next, loaded) = current.load(doc, merge);
            report = loaded;
            next
        });
        report
    }

    pub fn load_json(&self, content: &str, merge: bool) -> ScreenFlowResult<LoadReport> {
        let doc = ConfigDocument::from_json(content)?;
        Ok(self.load_config(&doc, merge))
    }

    fn executor_for(&self, graph: Arc<ScreenGraph>) -> Executor {
        let executor = Executor::new(self.session.clone(), graph, self.timing.clone());
        match &self.journal_dir {
            Some(dir) => executor.with_journal(dir.clone()),
            None => executor,
        }
    }

    /// Current screen, retried with a fixed backoff. Falls back to the
    /// synthetic system-home state when the device never answers.
    pub async fn discover_state(&self, graph: &ScreenGraph) -> AbstractState {
        let retries = self.timing.discovery_retries.max(1);
        for attempt in 1..=retries {
            match observe(&self.session, graph).await {
                Ok(state) => {
                    tracing::debug!(attempt, node = state.node_id(), "current state discovered");
                    return state;
                }
                Err(e) => {
                    tracing::warn!(attempt, retries, error = %e, "state discovery failed");
                    if attempt < retries {
                        tokio::time::sleep(self.timing.discovery_backoff()).await;
                    }
                }
            }
        }
        tracing::warn!("device unreachable, planning from system home");
        AbstractState::system_home()
    }

    /// Plans the route to function `name` from wherever the device is now.
    pub async fn plan_function(&self, name: &str, initial_params: &Variables) -> Result<Plan, PlanError> {
        match AssertUnwindSafe(self.build_plan(name, initial_params))
            .catch_unwind()
            .await
        {
            Ok(Ok(plan)) => {
                tracing::info!(
                    function = %name,
                    plan = %plan.id(),
                    steps = plan.path().edges.len(),
                    parameters = plan.parameters().len(),
                    "plan ready"
                );
                Ok(plan)
            }
            Ok(Err(e)) => {
                tracing::warn!(function = %name, error = %e, "no plan");
                Err(e)
            }
            Err(_) => {
                tracing::error!(function = %name, "planning panicked");
                Err(PlanError::Internal(format!("planning '{name}' aborted")))
            }
        }
    }

    async fn build_plan(&self, name: &str, initial_params: &Variables) -> Result<Plan, PlanError> {
        let graph = self.snapshot();
        let function = graph
            .function(name)
            .cloned()
            .ok_or_else(|| PlanError::UnknownFunction(name.to_string()))?;

        let current = self.discover_state(&graph).await;
        let target = graph
            .node(&function.target_node)
            .ok_or_else(|| PlanError::UnknownTargetNode {
                function: function.name.clone(),
                node: function.target_node.clone(),
            })?;
        let package = target.package_name.clone();

        let cross_app = current.package_name.as_deref() != Some(package.as_str());
        let (start, launch) = if cross_app {
            let home = graph
                .home_node(&package)
                .ok_or_else(|| PlanError::MissingHomeNode(package.clone()))?;
            let edge = PathEdge::synthetic(
                current.node_id(),
                home.name.clone(),
                Operation::launch_app(package.clone()),
                LAUNCH_EDGE_WEIGHT,
            );
            let launched = edge.operation.apply(&current).unwrap_or_else(|| current.clone());
            let root = graph
                .graph()
                .enter(&launched, &home.name)
                .with_variables(initial_params);
            tracing::debug!(from = current.node_id(), home = %home.name, "cross-application plan");
            (root, Some(edge))
        } else {
            (current.clone(), None)
        };

        let mut path = graph
            .graph()
            .find_path(&start, &function.target_node, initial_params)
            .map_err(|e| PlanError::NoRoute {
                from: start.node_id().to_string(),
                to: function.target_node.clone(),
                reason: e.to_string(),
            })?;
        if let Some(edge) = launch {
            path = path.prepend(current, edge);
        }

        let end = path
            .end()
            .cloned()
            .ok_or_else(|| PlanError::Internal("route has no states".into()))?;
        let terminal = function
            .operation
            .apply(&end)
            .ok_or_else(|| PlanError::TerminalInapplicable {
                function: function.name.clone(),
                node: end.node_id().to_string(),
            })?;
        let path = path.append(
            PathEdge::synthetic(
                end.node_id(),
                function.target_node.clone(),
                function.operation.clone(),
                TERMINAL_EDGE_WEIGHT,
            ),
            terminal,
        );

        let parameters = extract_parameters(path.operations());
        let executor = Arc::new(self.executor_for(graph));
        Ok(Plan::new(function.name, path, parameters, executor))
    }
}

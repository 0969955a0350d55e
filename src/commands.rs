use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::device::backend::{DeviceBackend, DeviceSession};
use crate::device::http::HttpDeviceBackend;
use crate::errors::ScreenFlowResult;
use crate::graph::catalog::FunctionDef;
use crate::graph::document::ConfigDocument;
use crate::graph::model::LoadReport;
use crate::planner::plan::{ExecutionResult, Plan};
use crate::planner::router::Router;
use crate::state::Variables;
use crate::store::{ConfigStore, ConfigSummary};

/// Public entry points: find configurations, list functions, plan and run.
pub struct ScreenFlow {
    router: Router,
    store: RwLock<ConfigStore>,
}

impl ScreenFlow {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: &AppConfig) -> Self {
        tracing::info!(backend = backend.name(), "screenflow starting");
        let session = Arc::new(DeviceSession::new(backend));
        Self {
            router: Router::from_config(session, config),
            store: RwLock::new(ConfigStore::from_config(&config.store)),
        }
    }

    /// Uses the HTTP device agent named in `config` and indexes the store.
    pub async fn connect(config: &AppConfig) -> ScreenFlowResult<Self> {
        let backend = Arc::new(HttpDeviceBackend::from_config(&config.device)?);
        let flow = Self::new(backend, config);
        flow.refresh_configs().await?;
        Ok(flow)
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub async fn refresh_configs(&self) -> ScreenFlowResult<usize> {
        self.store.write().await.refresh().await
    }

    pub async fn search_configs(&self, query: &str) -> Vec<ConfigSummary> {
        self.store
            .read()
            .await
            .search(query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn load_document(&self, doc: &ConfigDocument, merge: bool) -> LoadReport {
        self.router.load_config(doc, merge)
    }

    pub async fn load_package(&self, package_name: &str, merge: bool) -> ScreenFlowResult<LoadReport> {
        let doc = self.store.read().await.load(package_name).await?;
        Ok(self.router.load_config(&doc, merge))
    }

    /// Functions of the loaded graph, optionally limited to one package.
    pub fn list_functions(&self, package_name: Option<&str>) -> Vec<FunctionDef> {
        self.router
            .snapshot()
            .functions()
            .list(package_name)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Plans `function`. When `package_name` is given and not loaded yet its
    /// configuration is merged in from the store first.
    pub async fn plan(
        &self,
        function: &str,
        package_name: Option<&str>,
        params: &Variables,
    ) -> ScreenFlowResult<Plan> {
        if let Some(package) = package_name {
            let loaded = self.router.snapshot().packages().contains(package);
            if !loaded {
                let report = self.load_package(package, true).await?;
                tracing::info!(
                    package,
                    functions = report.functions_added,
                    warnings = report.warnings.len(),
                    "configuration auto-loaded"
                );
            }
        }
        Ok(self.router.plan_function(function, params).await?)
    }

    pub async fn execute(&self, plan: &Plan, values: Variables) -> ExecutionResult {
        let result = plan.execute(values).await;
        if result.success {
            tracing::info!(function = plan.function_name(), run = %result.run_id, "function executed");
        } else {
            tracing::warn!(
                function = plan.function_name(),
                run = %result.run_id,
                error = result.error.as_deref().unwrap_or(""),
                "function failed"
            );
        }
        result
    }

    /// Plans and executes in one step.
    pub async fn run(
        &self,
        function: &str,
        package_name: Option<&str>,
        params: Variables,
    ) -> ScreenFlowResult<ExecutionResult> {
        let plan = self.plan(function, package_name, &params).await?;
        Ok(self.execute(&plan, params).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StoreConfig, TimingConfig};
    use crate::device::recording::RecordingBackend;
    use crate::device::types::PageInfo;
    use crate::errors::{PlanError, ScreenFlowError};

    const MAIL: &str = r#"{
        "appName": "Mailer",
        "packageName": "com.example.mail",
        "nodes": [{"name": "Inbox", "description": "", "activityName": ".Inbox", "nodeType": "HOME"}],
        "functions": [{"name": "OpenInbox", "description": "Show mail", "targetNodeName": "Inbox"}]
    }"#;

    fn flow(dir: &std::path::Path) -> ScreenFlow {
        let config = AppConfig {
            timing: TimingConfig::without_delays(),
            store: StoreConfig {
                directories: vec![dir.to_path_buf()],
            },
            ..AppConfig::default()
        };
        let backend = Arc::new(RecordingBackend::new(PageInfo::new("com.example.mail", Some(".Inbox"))));
        ScreenFlow::new(backend, &config)
    }

    #[tokio::test]
    async fn plan_auto_loads_package_from_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mail.json"), MAIL).unwrap();
        let flow = flow(dir.path());
        flow.refresh_configs().await.unwrap();

        assert_eq!(flow.search_configs("mailer").await.len(), 1);
        assert!(flow.list_functions(None).is_empty());

        let plan = flow
            .plan("OpenInbox", Some("com.example.mail"), &Variables::new())
            .await
            .unwrap();
        assert!(plan.parameters().is_empty());
        assert_eq!(flow.list_functions(Some("com.example.mail")).len(), 1);

        let result = flow.execute(&plan, Variables::new()).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn planning_errors_surface_as_planning_variant() {
        let dir = tempfile::tempdir().unwrap();
        let flow = flow(dir.path());
        let err = flow.plan("Missing", None, &Variables::new()).await.unwrap_err();
        assert!(matches!(
            err,
            ScreenFlowError::Planning(PlanError::UnknownFunction(_))
        ));
        assert!(flow
            .plan("OpenInbox", Some("com.example.mail"), &Variables::new())
            .await
            .is_err());
    }
}

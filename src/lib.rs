pub mod commands;
pub mod config;
pub mod device;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod state;
pub mod store;

pub use commands::ScreenFlow;
pub use errors::{PlanError, ScreenFlowError, ScreenFlowResult};
pub use planner::plan::{ExecutionResult, Parameter, Plan};

/// Installs the fmt subscriber. `RUST_LOG` wins; the default level is `info`.
/// Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

/// Loads settings and connects to the configured device agent.
pub async fn run() -> ScreenFlowResult<ScreenFlow> {
    init_tracing();
    let config = match config::load_config() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load config; using defaults");
            config::AppConfig::default()
        }
    };
    ScreenFlow::connect(&config).await
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScreenFlowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Device error: {0}")]
    Device(String),

    #[error("Planning error: {0}")]
    Planning(#[from] PlanError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

impl serde::Serialize for ScreenFlowError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ScreenFlowResult<T> = Result<T, ScreenFlowError>;

/// Reasons a function could not be turned into a plan.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlanError {
    #[error("Function '{0}' not found")]
    UnknownFunction(String),

    #[error("Target node '{node}' of function '{function}' not found")]
    UnknownTargetNode { function: String, node: String },

    #[error("No home node declared for application '{0}'")]
    MissingHomeNode(String),

    #[error("No route from '{from}' to '{to}': {reason}")]
    NoRoute {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Operation of function '{function}' cannot be applied on node '{node}'")]
    TerminalInapplicable { function: String, node: String },

    #[error("Internal planning fault: {0}")]
    Internal(String),
}

impl serde::Serialize for PlanError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

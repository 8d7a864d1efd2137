/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/error.rs
 * Responsibility: Error taxonomy for the tool layer and the model boundary
 */

use thiserror::Error;

/// Failures recovered inside the tool layer and handed back to the model as text.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Cannot {action} \"{path}\" as it is outside the permitted working directory")]
    Containment { action: &'static str, path: String },

    #[error("File not found or is not a regular file: \"{path}\"")]
    NotFound { path: String },

    #[error("\"{path}\" is not a directory")]
    NotADirectory { path: String },

    #[error("\"{path}\" is not a .{extension} file")]
    WrongFileType { path: String, extension: String },

    #[error("executing file: \"{path}\" timed out after {secs} seconds")]
    Timeout { path: String, secs: u64 },

    #[error("executing file: {source}")]
    Launch {
        #[source]
        source: std::io::Error,
    },

    #[error("\"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArguments { tool: &'static str, reason: String },

    #[error("Unknown function: {name}")]
    UnknownTool { name: String },
}

impl ToolError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        ToolError::Io {
            path: path.into(),
            source,
        }
    }

    /// The uniform string delivered to the model.
    pub fn to_tool_text(&self) -> String {
        format!("Error: {}", self)
    }
}

/// Failures that end the run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("model request failed: {0}")]
    Upstream(String),

    #[error("malformed model response: {0}")]
    ResponseShape(String),
}

impl From<reqwest::Error> for AgentError {
    fn from(err: reqwest::Error) -> Self {
        AgentError::Upstream(err.to_string())
    }
}

/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/registry.rs
 * Responsibility: Tool schemas, typed call decoding, and dispatch
 */

use crate::error::ToolError;
use crate::llm::{FunctionCall, Message, MessageRole, MultimodalPart};
use crate::sandbox::Sandbox;
use crate::tools::{self, ReadLimits, ScriptOutput, ScriptPolicy};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::fmt;
use tracing::debug;

/// The closed set of tools the model may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    ListDirectory,
    ReadFile,
    WriteFile,
    ExecuteScript,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::ListDirectory,
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::ExecuteScript,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListDirectory => "list_directory",
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::ExecuteScript => "execute_script",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn descriptor(self, script_extension: &str) -> ToolDescriptor {
        let (description, parameters) = match self {
            ToolKind::ListDirectory => (
                "Lists files in the specified directory along with their sizes, constrained to the working directory.".to_string(),
                json!({
                    "type": "object",
                    "properties": {
                        "directory": {
                            "type": "string",
                            "description": "The directory to list files from, relative to the working directory. If not provided, lists files in the working directory itself."
                        }
                    }
                }),
            ),
            ToolKind::ReadFile => (
                "Returns the contents of a specified file as a string. Does not execute files.".to_string(),
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The path to the file to read, relative to the working directory. Must include the filename."
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
            ToolKind::WriteFile => (
                "Creates or overwrites a text file within the working directory with the provided content. Creates intermediate directories if they do not exist. Returns a success message with the number of characters written.".to_string(),
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "The path to the file to create or overwrite, relative to the working directory. Must include the filename."
                        },
                        "content": {
                            "type": "string",
                            "description": "The text content to write to the file."
                        }
                    },
                    "required": ["file_path", "content"]
                }),
            ),
            ToolKind::ExecuteScript => (
                format!(
                    "Executes a .{} script inside the working directory and returns its standard output and standard error.",
                    script_extension
                ),
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": format!(
                                "The path to the script to execute, relative to the working directory. Must include the filename and have a .{} extension.",
                                script_extension
                            )
                        },
                        "args": {
                            "type": "array",
                            "description": "Optional list of command-line arguments to pass to the script.",
                            "items": { "type": "string" }
                        }
                    },
                    "required": ["file_path"]
                }),
            ),
        };

        ToolDescriptor {
            name: self.name(),
            description,
            parameters,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: String,
    pub parameters: Value,
}

impl ToolDescriptor {
    pub fn to_declaration(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters
        })
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ListDirectoryArgs {
    #[serde(default)]
    pub directory: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReadFileArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecuteScriptArgs {
    pub file_path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// A model request decoded into the arguments of one specific tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    ListDirectory(ListDirectoryArgs),
    ReadFile(ReadFileArgs),
    WriteFile(WriteFileArgs),
    ExecuteScript(ExecuteScriptArgs),
}

impl ToolCall {
    pub fn parse(call: &FunctionCall) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(&call.name).ok_or_else(|| ToolError::UnknownTool {
            name: call.name.clone(),
        })?;

        Ok(match kind {
            ToolKind::ListDirectory => ToolCall::ListDirectory(decode_args(kind, &call.args)?),
            ToolKind::ReadFile => ToolCall::ReadFile(decode_args(kind, &call.args)?),
            ToolKind::WriteFile => ToolCall::WriteFile(decode_args(kind, &call.args)?),
            ToolKind::ExecuteScript => ToolCall::ExecuteScript(decode_args(kind, &call.args)?),
        })
    }

    pub fn kind(&self) -> ToolKind {
        match self {
            ToolCall::ListDirectory(_) => ToolKind::ListDirectory,
            ToolCall::ReadFile(_) => ToolKind::ReadFile,
            ToolCall::WriteFile(_) => ToolKind::WriteFile,
            ToolCall::ExecuteScript(_) => ToolKind::ExecuteScript,
        }
    }
}

fn decode_args<T: DeserializeOwned>(kind: ToolKind, args: &Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args.clone() };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments {
        tool: kind.name(),
        reason: e.to_string(),
    })
}

/// Everything a tool call needs besides its arguments. The model never sees or sets it.
#[derive(Debug, Clone)]
pub struct ToolRuntime {
    pub sandbox: Sandbox,
    pub read_limits: ReadLimits,
    pub script_policy: ScriptPolicy,
}

impl ToolRuntime {
    pub fn new(sandbox: Sandbox) -> Self {
        Self {
            sandbox,
            read_limits: ReadLimits::default(),
            script_policy: ScriptPolicy::default(),
        }
    }

    /// The `functionDeclarations` array sent with every model request.
    pub fn function_declarations(&self) -> Value {
        Value::Array(
            ToolKind::ALL
                .iter()
                .map(|kind| kind.descriptor(&self.script_policy.extension).to_declaration())
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPayload {
    /// Tool output, including tool-level `Error: ...` strings.
    Result(String),
    /// The call never reached a tool.
    Error(String),
}

#[derive(Debug, Clone)]
pub struct ToolResult {
    pub name: String,
    pub payload: ToolPayload,
    /// What the console shows for this result in verbose mode.
    pub echo: String,
}

impl ToolResult {
    pub fn response_json(&self) -> Value {
        match &self.payload {
            ToolPayload::Result(text) => json!({ "result": text }),
            ToolPayload::Error(text) => json!({ "error": text }),
        }
    }

    pub fn into_message(self) -> Message {
        let response = self.response_json();
        Message {
            role: MessageRole::Tool,
            parts: vec![MultimodalPart::function_response(self.name, response)],
        }
    }
}

/// Route one model request to its tool. Never fails: every outcome becomes content for the model.
pub async fn dispatch(call: &FunctionCall, runtime: &ToolRuntime) -> ToolResult {
    let parsed = match ToolCall::parse(call) {
        Ok(parsed) => parsed,
        Err(err) => {
            debug!(tool = %call.name, error = %err, "rejected tool call");
            let text = err.to_string();
            return ToolResult {
                name: call.name.clone(),
                payload: ToolPayload::Error(text.clone()),
                echo: text,
            };
        }
    };

    let (text, echo) = match run_tool(&parsed, runtime).await {
        Ok(ToolOutput::Script(ScriptOutput::Captured { stdout, stderr, exit_code })) => {
            let echo = [stdout.trim(), stderr.trim()]
                .into_iter()
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n");
            let text = ScriptOutput::Captured {
                stdout,
                stderr,
                exit_code,
            }
            .to_string();
            (text, echo)
        }
        Ok(output) => {
            let text = output.to_string();
            (text.clone(), text)
        }
        Err(err) => {
            let text = err.to_tool_text();
            (text.clone(), text)
        }
    };

    ToolResult {
        name: parsed.kind().name().to_string(),
        payload: ToolPayload::Result(text),
        echo,
    }
}

enum ToolOutput {
    Listing(tools::DirectoryListing),
    Content(tools::FileContent),
    Written(tools::WriteReceipt),
    Script(ScriptOutput),
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutput::Listing(listing) => fmt::Display::fmt(listing, f),
            ToolOutput::Content(content) => fmt::Display::fmt(content, f),
            ToolOutput::Written(receipt) => fmt::Display::fmt(receipt, f),
            ToolOutput::Script(output) => fmt::Display::fmt(output, f),
        }
    }
}

async fn run_tool(call: &ToolCall, runtime: &ToolRuntime) -> Result<ToolOutput, ToolError> {
    let sandbox = &runtime.sandbox;
    match call {
        ToolCall::ListDirectory(args) => {
            tools::list_directory(sandbox, args.directory.as_deref()).map(ToolOutput::Listing)
        }
        ToolCall::ReadFile(args) => {
            tools::read_file(sandbox, &args.file_path, runtime.read_limits).map(ToolOutput::Content)
        }
        ToolCall::WriteFile(args) => {
            tools::write_file(sandbox, &args.file_path, &args.content).map(ToolOutput::Written)
        }
        ToolCall::ExecuteScript(args) => {
            tools::execute_script(sandbox, &args.file_path, &args.args, &runtime.script_policy)
                .await
                .map(ToolOutput::Script)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn call(name: &str, args: Value) -> FunctionCall {
        FunctionCall {
            name: name.to_string(),
            args,
        }
    }

    fn runtime(path: &std::path::Path) -> ToolRuntime {
        ToolRuntime::new(Sandbox::new(path).unwrap())
    }

    #[test]
    fn test_declarations_cover_the_four_tools() {
        let dir = tempdir().unwrap();
        let declarations = runtime(dir.path()).function_declarations();
        let names: Vec<&str> = declarations
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["name"].as_str().unwrap())
            .collect();

        assert_eq!(names, ["list_directory", "read_file", "write_file", "execute_script"]);
        assert_eq!(declarations[2]["parameters"]["required"], json!(["file_path", "content"]));
        assert_eq!(declarations[3]["parameters"]["properties"]["args"]["type"], "array");
        assert!(declarations[0]["parameters"].get("required").is_none());
    }

    #[test]
    fn test_parse_decodes_typed_arguments() {
        assert_eq!(
            ToolCall::parse(&call("list_directory", Value::Null)).unwrap(),
            ToolCall::ListDirectory(ListDirectoryArgs { directory: None })
        );
        assert_eq!(
            ToolCall::parse(&call("execute_script", json!({ "file_path": "main.py", "args": ["3 + 5"] }))).unwrap(),
            ToolCall::ExecuteScript(ExecuteScriptArgs {
                file_path: "main.py".to_string(),
                args: vec!["3 + 5".to_string()],
            })
        );
    }

    #[test]
    fn test_parse_fails_closed() {
        assert!(matches!(
            ToolCall::parse(&call("delete_everything", json!({}))),
            Err(ToolError::UnknownTool { .. })
        ));
        assert!(matches!(
            ToolCall::parse(&call("write_file", json!({ "file_path": "a.txt" }))),
            Err(ToolError::InvalidArguments { tool: "write_file", .. })
        ));
        assert!(matches!(
            ToolCall::parse(&call("read_file", json!({ "file_path": "a.txt", "working_directory": "/" }))),
            Err(ToolError::InvalidArguments { tool: "read_file", .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool_is_error_payload() {
        let dir = tempdir().unwrap();
        let result = dispatch(&call("rm_rf", json!({})), &runtime(dir.path())).await;

        assert_eq!(result.name, "rm_rf");
        assert_eq!(result.payload, ToolPayload::Error("Unknown function: rm_rf".to_string()));
        assert_eq!(result.response_json(), json!({ "error": "Unknown function: rm_rf" }));
    }

    #[tokio::test]
    async fn test_dispatch_wraps_tool_errors_as_results() {
        let dir = tempdir().unwrap();
        let result = dispatch(
            &call("read_file", json!({ "file_path": "../../etc/passwd" })),
            &runtime(dir.path()),
        )
        .await;

        match result.payload {
            ToolPayload::Result(text) => {
                assert!(text.starts_with("Error: Cannot read \"../../etc/passwd\""));
            }
            other => panic!("expected result payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dispatch_runs_tool_inside_sandbox() {
        let dir = tempdir().unwrap();
        let rt = runtime(dir.path());

        let written = dispatch(
            &call("write_file", json!({ "file_path": "pkg/lorem.txt", "content": "wait, this isn't lorem ipsum" })),
            &rt,
        )
        .await;
        assert_eq!(
            written.payload,
            ToolPayload::Result("Successfully wrote to \"pkg/lorem.txt\" (28 characters written)".to_string())
        );

        let read = dispatch(&call("read_file", json!({ "file_path": "pkg/lorem.txt" })), &rt).await;
        assert_eq!(read.payload, ToolPayload::Result("wait, this isn't lorem ipsum".to_string()));
        assert_eq!(
            fs::read_to_string(dir.path().join("pkg").join("lorem.txt")).unwrap(),
            "wait, this isn't lorem ipsum"
        );

        let message = read.into_message();
        assert_eq!(message.role, MessageRole::Tool);
        assert_eq!(message.parts.len(), 1);
        assert_eq!(message.parts[0].function_response.as_ref().unwrap().name, "read_file");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dispatch_echoes_script_streams_separately() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("hello.sh"), "echo out\necho err >&2\n").unwrap();
        let mut rt = runtime(dir.path());
        rt.script_policy = ScriptPolicy {
            extension: "sh".to_string(),
            interpreter: "sh".to_string(),
            timeout: std::time::Duration::from_secs(5),
        };

        let result = dispatch(&call("execute_script", json!({ "file_path": "hello.sh" })), &rt).await;
        assert_eq!(result.payload, ToolPayload::Result("STDOUT: out\nSTDERR: err".to_string()));
        assert_eq!(result.echo, "out\nerr");
    }
}

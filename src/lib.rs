/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/lib.rs
 * Responsibility: Shared library modules
 */

pub mod agent_loop;
pub mod config;
pub mod error;
pub mod llm;
pub mod prompts;
pub mod registry;
pub mod sandbox;
pub mod tools;

pub use agent_loop::{AgentLoop, AgentOutcome, AgentRun, AgentSettings};
pub use error::{AgentError, ToolError};
pub use registry::ToolRuntime;
pub use sandbox::Sandbox;

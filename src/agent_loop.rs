/*
 * Warden - Sandboxed Tool-Calling Agent
 * File Path: src/agent_loop.rs
 * Responsibility: Native tool-calling agent loop and its termination policy.
 */

use crate::config::DEFAULT_MAX_ITERATIONS;
use crate::error::AgentError;
use crate::llm::{self, ModelClient, ModelRequest};
use crate::prompts::SYSTEM_PROMPT;
use crate::registry::{self, ToolRuntime};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub max_iterations: usize,
    pub system_prompt: String,
    /// Echo token counts, full call arguments and tool results to stdout.
    pub verbose: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: SYSTEM_PROMPT.to_string(),
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    Final(String),
    /// The iteration ceiling was hit before the model produced an answer.
    Exhausted,
}

#[derive(Debug, Clone)]
pub struct AgentRun {
    pub outcome: AgentOutcome,
    /// Every message exchanged, in order, starting with the user prompt.
    pub history: Vec<llm::Message>,
    /// Model calls made.
    pub iterations: usize,
}

pub struct AgentLoop<C> {
    client: C,
    runtime: ToolRuntime,
    settings: AgentSettings,
    tools: Value,
}

impl<C: ModelClient> AgentLoop<C> {
    pub fn new(client: C, runtime: ToolRuntime, settings: AgentSettings) -> Self {
        let tools = runtime.function_declarations();
        Self {
            client,
            runtime,
            settings,
            tools,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Drive one conversation to a final answer or to the iteration ceiling.
    ///
    /// Each iteration is one model call over the full history. Requested tool
    /// calls run one after another in the order the model listed them, and
    /// each result is appended before the next model call. Only a failing
    /// model call ends the run with an error.
    pub async fn run(&self, prompt: &str) -> Result<AgentRun, AgentError> {
        let mut history = vec![llm::Message::user_text(prompt)];
        let max_iterations = self.settings.max_iterations.max(1);
        let mut iterations = 0;

        while iterations < max_iterations {
            iterations += 1;
            debug!(iteration = iterations, max_iterations, messages = history.len(), "calling model");

            let response = self
                .client
                .generate(ModelRequest {
                    system_prompt: &self.settings.system_prompt,
                    history: &history,
                    tools: &self.tools,
                })
                .await?;

            if self.settings.verbose {
                let usage = response.usage.unwrap_or_default();
                println!("Prompt tokens: {}", usage.prompt_token_count);
                println!("Response tokens: {}", usage.candidates_token_count);
            }

            if !response.parts.is_empty() {
                history.push(llm::Message {
                    role: llm::MessageRole::Model,
                    parts: response.parts.clone(),
                });
            }

            if response.calls.is_empty() {
                match response.text {
                    Some(text) => {
                        info!(iterations, "model produced a final answer");
                        return Ok(AgentRun {
                            outcome: AgentOutcome::Final(text),
                            history,
                            iterations,
                        });
                    }
                    None => {
                        warn!(iteration = iterations, "model returned neither text nor tool calls");
                        continue;
                    }
                }
            }

            for call in &response.calls {
                if self.settings.verbose {
                    println!("Calling function: {}({})", call.name, call.args);
                } else {
                    println!(" - Calling function: {}", call.name);
                }

                let result = registry::dispatch(call, &self.runtime).await;
                if self.settings.verbose && !result.echo.is_empty() {
                    println!("{}", result.echo);
                }
                history.push(result.into_message());
            }
        }

        warn!(max_iterations, "iteration limit reached without a final answer");
        Ok(AgentRun {
            outcome: AgentOutcome::Exhausted,
            history,
            iterations,
        })
    }
}

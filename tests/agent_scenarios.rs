use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::fs;
use std::sync::Mutex;
use tempfile::tempdir;
use warden::llm::{self, ModelClient, ModelRequest, ModelResponse, MultimodalPart};
use warden::{AgentError, AgentLoop, AgentOutcome, AgentSettings, Sandbox, ToolRuntime};

/// Replays canned turns and records the history it was shown on each call.
struct ScriptedModel {
    turns: Mutex<VecDeque<Result<ModelResponse, AgentError>>>,
    seen: Mutex<Vec<Vec<llm::Message>>>,
    fallback: Option<ModelResponse>,
}

impl ScriptedModel {
    fn new(turns: Vec<Result<ModelResponse, AgentError>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            seen: Mutex::new(Vec::new()),
            fallback: None,
        }
    }

    fn repeating(turn: ModelResponse) -> Self {
        Self {
            turns: Mutex::new(VecDeque::new()),
            seen: Mutex::new(Vec::new()),
            fallback: Some(turn),
        }
    }

    fn calls_seen(&self) -> Vec<Vec<llm::Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate(&self, request: ModelRequest<'_>) -> Result<ModelResponse, AgentError> {
        assert_eq!(request.tools.as_array().map(Vec::len), Some(4));
        self.seen.lock().unwrap().push(request.history.to_vec());
        match self.turns.lock().unwrap().pop_front() {
            Some(turn) => turn,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AgentError::Upstream("script exhausted".to_string())),
        }
    }
}

fn tool_turn(calls: &[(&str, Value)]) -> ModelResponse {
    let parts = calls
        .iter()
        .map(|(name, args)| MultimodalPart::function_call(*name, args.clone()))
        .collect();
    ModelResponse::from_parts(parts, None)
}

fn text_turn(text: &str) -> ModelResponse {
    ModelResponse::from_parts(vec![MultimodalPart::text(text)], None)
}

fn tool_results(history: &[llm::Message]) -> Vec<(String, Value)> {
    history
        .iter()
        .filter(|m| m.role == llm::MessageRole::Tool)
        .flat_map(|m| m.parts.iter())
        .filter_map(|p| p.function_response.as_ref())
        .map(|r| (r.name.clone(), r.response.clone()))
        .collect()
}

fn agent(model: ScriptedModel, root: &std::path::Path) -> AgentLoop<ScriptedModel> {
    let runtime = ToolRuntime::new(Sandbox::new(root).unwrap());
    AgentLoop::new(model, runtime, AgentSettings::default())
}

#[tokio::test]
async fn test_lists_root_then_answers() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "hello").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();

    let model = ScriptedModel::new(vec![
        Ok(tool_turn(&[("list_directory", json!({}))])),
        Ok(text_turn("The root holds a.txt (5 bytes) and a sub directory.")),
    ]);
    let agent = agent(model, dir.path());

    let run = agent.run("list files in the root").await.unwrap();
    assert_eq!(
        run.outcome,
        AgentOutcome::Final("The root holds a.txt (5 bytes) and a sub directory.".to_string())
    );
    assert_eq!(run.iterations, 2);

    let results = tool_results(&run.history);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "list_directory");
    let listing = results[0].1["result"].as_str().unwrap();
    let mut lines: Vec<&str> = listing.lines().collect();
    lines.sort();
    assert_eq!(lines[0], "a.txt: file_size=5 bytes, is_dir=false");
    assert!(lines[1].starts_with("sub: file_size=") && lines[1].ends_with("is_dir=true"));

    // The second model call saw the listing.
    let seen = agent.client().calls_seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].len(), 1);
    assert_eq!(tool_results(&seen[1]).len(), 1);
}

#[tokio::test]
async fn test_escape_attempt_is_fed_back_not_raised() {
    let dir = tempdir().unwrap();

    let model = ScriptedModel::new(vec![
        Ok(tool_turn(&[("read_file", json!({ "file_path": "../../etc/passwd" }))])),
        Ok(text_turn("I can only read files inside the working directory.")),
    ]);

    let run = agent(model, dir.path()).run("show me /etc/passwd").await.unwrap();
    assert!(matches!(run.outcome, AgentOutcome::Final(ref t) if t.contains("inside the working directory")));

    let results = tool_results(&run.history);
    let text = results[0].1["result"].as_str().unwrap();
    assert!(text.starts_with("Error: Cannot read \"../../etc/passwd\""));
    assert!(text.contains("outside the permitted working directory"));
}

#[tokio::test]
async fn test_stops_at_iteration_ceiling_without_answer() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::repeating(tool_turn(&[("list_directory", json!({}))]));
    let agent = agent(model, dir.path());

    let run = agent.run("keep looking forever").await.unwrap();
    assert_eq!(run.outcome, AgentOutcome::Exhausted);
    assert_eq!(run.iterations, 20);
    assert_eq!(agent.client().calls_seen().len(), 20);
    assert_eq!(tool_results(&run.history).len(), 20);
}

#[tokio::test]
async fn test_every_call_is_answered_in_order_before_next_turn() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.py"), "print(1)").unwrap();

    let model = ScriptedModel::new(vec![
        Ok(tool_turn(&[
            ("write_file", json!({ "file_path": "out/notes.md", "content": "draft" })),
            ("read_file", json!({ "file_path": "out/notes.md" })),
            ("summon_daemon", json!({})),
            ("read_file", json!({ "path": "main.py" })),
        ])),
        Ok(text_turn("done")),
    ]);
    let agent = agent(model, dir.path());

    let run = agent.run("take notes").await.unwrap();
    assert_eq!(run.outcome, AgentOutcome::Final("done".to_string()));

    let seen = agent.client().calls_seen();
    let results = tool_results(&seen[1]);
    let names: Vec<&str> = results.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["write_file", "read_file", "summon_daemon", "read_file"]);

    assert_eq!(
        results[0].1["result"],
        "Successfully wrote to \"out/notes.md\" (5 characters written)"
    );
    // Calls run sequentially, so the read sees the write.
    assert_eq!(results[1].1["result"], "draft");
    assert_eq!(results[2].1, json!({ "error": "Unknown function: summon_daemon" }));
    assert!(results[3].1["error"].as_str().unwrap().starts_with("Invalid arguments for read_file"));

    // user, model turn, one message per result, final model turn
    assert_eq!(run.history.len(), 1 + 1 + 4 + 1);
    assert!(
        run.history[2..6]
            .iter()
            .all(|m| m.role == llm::MessageRole::Tool && m.parts.len() == 1)
    );
}

#[tokio::test]
async fn test_model_failure_aborts_run() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok(tool_turn(&[("write_file", json!({ "file_path": "a.txt", "content": "x" }))])),
        Err(AgentError::Upstream("503 Service Unavailable".to_string())),
    ]);

    let err = agent(model, dir.path()).run("write then fail").await.unwrap_err();
    assert!(matches!(err, AgentError::Upstream(_)));
    assert!(dir.path().join("a.txt").exists());
}

#[tokio::test]
async fn test_empty_turn_is_not_an_answer() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok(ModelResponse::default()),
        Ok(text_turn("second try")),
    ]);

    let run = agent(model, dir.path()).run("hello").await.unwrap();
    assert_eq!(run.outcome, AgentOutcome::Final("second try".to_string()));
    assert_eq!(run.iterations, 2);
    assert_eq!(run.history.len(), 2);
}

#[tokio::test]
async fn test_history_only_grows() {
    let dir = tempdir().unwrap();
    let model = ScriptedModel::new(vec![
        Ok(tool_turn(&[("list_directory", json!({ "directory": "." }))])),
        Ok(tool_turn(&[("list_directory", json!({}))])),
        Ok(text_turn("empty")),
    ]);
    let agent = agent(model, dir.path());

    let run = agent.run("what is here").await.unwrap();
    let seen = agent.client().calls_seen();
    for pair in seen.windows(2) {
        let (before, after) = (&pair[0], &pair[1]);
        assert!(after.len() > before.len());
        for (old, new) in before.iter().zip(after.iter()) {
            assert_eq!(
                serde_json::to_value(old).unwrap(),
                serde_json::to_value(new).unwrap()
            );
        }
    }
    assert!(run.history.len() > seen.last().unwrap().len());
}

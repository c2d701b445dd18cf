//! End-to-end turns through the controller with scripted providers.

mod common;

use common::{ScriptedProvider, StalledProvider, test_config};
use repl_engine::{Config, Controller};
use repl_sandbox::Sandbox;
use repl_session::{Layout, SessionTarget};
use repl_types::{Provider, Role, ToolCall, TurnError};

struct Harness {
    _store_dir: tempfile::TempDir,
    sandbox_dir: tempfile::TempDir,
    layout: Layout,
}

impl Harness {
    fn new() -> Self {
        let store_dir = tempfile::tempdir().expect("store dir");
        let sandbox_dir = tempfile::tempdir().expect("sandbox dir");
        let layout = Layout::new(store_dir.path(), "test-project");
        Self {
            _store_dir: store_dir,
            sandbox_dir,
            layout,
        }
    }

    async fn controller<P: Provider>(&self, provider: P, config: Config) -> Controller<P> {
        let sandbox = Sandbox::new(self.sandbox_dir.path()).expect("sandbox");
        Controller::new(provider, sandbox, self.layout.clone(), SessionTarget::New, config)
            .await
            .expect("controller")
    }

    fn session_lines(&self, id: uuid::Uuid) -> Vec<serde_json::Value> {
        let data = std::fs::read_to_string(self.layout.session_file(id)).expect("session file");
        data.lines()
            .map(|line| serde_json::from_str(line).expect("valid journal line"))
            .collect()
    }
}

fn entry_types(lines: &[serde_json::Value]) -> Vec<&str> {
    lines.iter().map(|l| l["type"].as_str().unwrap()).collect()
}

fn assert_chained(lines: &[serde_json::Value]) {
    assert!(lines[0]["parentUuid"].is_null());
    for pair in lines.windows(2) {
        assert_eq!(pair[1]["parentUuid"], pair[0]["uuid"], "chain must follow append order");
    }
}

#[tokio::test]
async fn simple_qa_journals_a_chained_pair() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new().script_no_tool().script_text("2 + 2 = 4");
    let controller = harness.controller(provider, test_config()).await;

    let outcome = controller.handle("2 + 2").await.unwrap();
    assert!(outcome.text.contains('4'));
    assert!(outcome.tool_uses.is_empty());
    assert!(!outcome.trampoline_limited);
    assert_eq!(outcome.usage.unwrap().total(), 15);

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(entry_types(&lines), ["user", "assistant"]);
    assert_chained(&lines);
    assert_eq!(lines[1]["metadata"]["tokens"], 15);
    assert!(lines[1]["metadata"]["duration_ms"].is_u64());
}

#[tokio::test]
async fn decision_cache_skips_the_second_classification() {
    let harness = Harness::new();
    let provider = std::sync::Arc::new(
        ScriptedProvider::new()
            .script_no_tool()
            .script_text("4")
            .script_text("still 4"),
    );
    let controller = harness.controller(provider.clone(), test_config()).await;

    controller.handle("2 + 2").await.unwrap();
    controller.handle("2 + 2").await.unwrap();
    // one structured classification serves both identical utterances
    assert_eq!(
        provider.structured_calls.load(std::sync::atomic::Ordering::SeqCst),
        1
    );
    assert_eq!(
        provider.generate_calls.load(std::sync::atomic::Ordering::SeqCst),
        2
    );
}

#[tokio::test]
async fn read_file_stage_one_enhances_the_prompt() {
    let harness = Harness::new();
    std::fs::write(harness.sandbox_dir.path().join("Makefile"), "all: build\n").unwrap();

    let provider = ScriptedProvider::new()
        .script_structured(Ok(serde_json::json!({
            "requires_tool_call": true,
            "tool_name": "read_file",
            "file_path": "Makefile",
            "reasoning": "the user asked for the file",
        })))
        .script_text("The Makefile contains: all: build");
    let controller = harness.controller(provider, test_config()).await;

    let outcome = controller.handle("read the Makefile").await.unwrap();
    assert!(outcome.text.contains("all: build"));
    assert_eq!(outcome.tool_uses.len(), 1);
    assert!(outcome.tool_uses[0].ok);
    assert!(matches!(
        &outcome.tool_uses[0].call,
        ToolCall::ReadFile { file_path } if file_path == "Makefile"
    ));

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(entry_types(&lines), ["user", "tool_use", "assistant"]);
    assert_chained(&lines);
    assert_eq!(lines[1]["metadata"]["tool"], "read_file");
    assert_eq!(lines[1]["metadata"]["args"]["file_path"], "Makefile");
    assert_eq!(lines[1]["metadata"]["result_preview"], "all: build\n");
}

#[tokio::test]
async fn enhanced_prompt_reaches_the_model_inline() {
    let harness = Harness::new();
    std::fs::write(harness.sandbox_dir.path().join("Makefile"), "all: build\n").unwrap();

    let provider = std::sync::Arc::new(
        ScriptedProvider::new()
            .script_structured(Ok(serde_json::json!({
                "requires_tool_call": true,
                "tool_name": "read_file",
                "file_path": "Makefile",
                "reasoning": "file contents requested",
            })))
            .script_text("done"),
    );
    let controller = harness.controller(provider.clone(), test_config()).await;
    controller.handle("read the Makefile").await.unwrap();

    // the model saw one user message holding the utterance, a marker line,
    // and the inlined tool result
    let request = provider.last_request();
    let user_messages: Vec<_> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .collect();
    assert_eq!(user_messages.len(), 1);
    assert!(user_messages[0].content.starts_with("read the Makefile"));
    assert!(user_messages[0].content.contains("--- read_file result ---"));
    assert!(user_messages[0].content.contains("all: build"));
    assert!(!request.tools.is_empty(), "tools are declared on the request");

    // the journal keeps the original utterance, not the enhanced prompt
    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(lines[0]["message"]["content"], "read the Makefile");
}

#[tokio::test]
async fn write_file_creates_directories_and_bytes_match() {
    let harness = Harness::new();
    let content = "---- MODULE Fibonacci ----\n====\n";
    let provider = ScriptedProvider::new()
        .script_structured(Ok(serde_json::json!({
            "requires_tool_call": true,
            "tool_name": "write_file",
            "file_path": "research/formal/Fibonacci.tla",
            "content": content,
            "reasoning": "the user asked to create a file",
        })))
        .script_text("Created research/formal/Fibonacci.tla");
    let controller = harness.controller(provider, test_config()).await;

    let outcome = controller
        .handle("create research/formal/Fibonacci.tla with a Fibonacci spec")
        .await
        .unwrap();
    assert!(outcome.text.contains("Created"));

    let on_disk = std::fs::read_to_string(
        harness.sandbox_dir.path().join("research/formal/Fibonacci.tla"),
    )
    .unwrap();
    assert_eq!(on_disk, content);

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(lines[1]["metadata"]["tool"], "write_file");
    assert_eq!(
        lines[1]["metadata"]["args"]["file_path"],
        "research/formal/Fibonacci.tla"
    );
}

#[tokio::test]
async fn trampoline_executes_calls_in_emission_order() {
    let harness = Harness::new();
    std::fs::write(harness.sandbox_dir.path().join("README.md"), "# demo\n").unwrap();
    std::fs::write(harness.sandbox_dir.path().join("main.rs"), "fn main() {}\n").unwrap();

    let provider = std::sync::Arc::new(
        ScriptedProvider::new()
            .script_no_tool()
            .script_call("list_files", serde_json::json!({ "pattern": "**/*" }))
            .script_call("read_file", serde_json::json!({ "file_path": "README.md" }))
            .script_text("A demo crate with a README and an entry point."),
    );
    let controller = harness.controller(provider.clone(), test_config()).await;

    let outcome = controller.handle("summarize this codebase").await.unwrap();
    assert!(outcome.text.contains("demo crate"));
    assert_eq!(outcome.tool_uses.len(), 2);
    assert_eq!(outcome.tool_uses[0].call.name(), "list_files");
    assert_eq!(outcome.tool_uses[1].call.name(), "read_file");

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(
        entry_types(&lines),
        ["user", "tool_use", "tool_use", "assistant"]
    );
    assert_chained(&lines);
    assert_eq!(lines[1]["metadata"]["tool"], "list_files");
    assert_eq!(lines[2]["metadata"]["tool"], "read_file");

    // the final model call saw both tool results as named tool messages
    let request = provider.last_request();
    let tool_messages: Vec<_> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0].tool_name.as_deref(), Some("list_files"));
    assert!(tool_messages[0].content.contains("README.md"));
    assert_eq!(tool_messages[1].tool_name.as_deref(), Some("read_file"));
    assert!(tool_messages[1].content.contains("# demo"));
}

#[tokio::test]
async fn trampoline_cap_annotates_and_stops() {
    let harness = Harness::new();
    std::fs::write(harness.sandbox_dir.path().join("a.txt"), "a").unwrap();

    let mut config = test_config();
    config.max_trampoline_iterations = 3;
    let mut provider = ScriptedProvider::new().script_no_tool();
    for _ in 0..4 {
        provider = provider.script_call("read_file", serde_json::json!({ "file_path": "a.txt" }));
    }
    let controller = harness.controller(provider, config).await;

    let outcome = controller.handle("loop forever").await.unwrap();
    assert!(outcome.trampoline_limited);
    assert!(outcome.text.ends_with("(trampoline limit reached)"));
    assert_eq!(outcome.tool_uses.len(), 3, "the capped response is not executed");
}

#[tokio::test]
async fn path_traversal_becomes_a_tool_result_error() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new()
        .script_no_tool()
        .script_call("read_file", serde_json::json!({ "file_path": "../../etc/passwd" }))
        .script_text("I cannot read outside the workspace.");
    let controller = harness.controller(provider, test_config()).await;

    let outcome = controller.handle("read ../../etc/passwd").await.unwrap();
    assert!(!outcome.text.contains("root:"));
    assert_eq!(outcome.tool_uses.len(), 1);
    assert!(!outcome.tool_uses[0].ok);

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(lines[1]["type"], "tool_use");
    let journalled_error = lines[1]["metadata"]["error"].as_str().unwrap();
    assert!(journalled_error.contains("security violation"));
}

#[tokio::test]
async fn unknown_tool_names_are_survivable() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new()
        .script_no_tool()
        .script_call("rm_rf", serde_json::json!({}))
        .script_text("that tool does not exist");
    let controller = harness.controller(provider, test_config()).await;

    let outcome = controller.handle("destroy everything").await.unwrap();
    assert!(outcome.text.contains("does not exist"));
    assert!(outcome.tool_uses.is_empty());

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(lines[1]["type"], "tool_use");
    assert!(lines[1]["metadata"]["error"].as_str().unwrap().contains("unknown tool"));
}

#[tokio::test(start_paused = true)]
async fn stalled_transport_times_out_and_is_journaled() {
    let harness = Harness::new();
    let mut config = test_config();
    config.structured_dispatch = false;
    config.turn_timeout = std::time::Duration::from_secs(5);
    let controller = harness.controller(StalledProvider, config).await;

    let err = controller.handle("hello?").await.unwrap_err();
    assert!(matches!(err, TurnError::Timeout(_)));

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(entry_types(&lines), ["user", "error"]);
    assert_eq!(lines[1]["metadata"]["error"], "timeout");
}

#[tokio::test]
async fn cancellation_aborts_and_the_next_turn_recovers() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new().script_no_tool().script_text("back to normal");
    let controller = harness.controller(provider, test_config()).await;

    controller.cancellation_token().cancel();
    let err = controller.handle("first").await.unwrap_err();
    assert!(matches!(err, TurnError::Cancelled));

    let outcome = controller.handle("second").await.unwrap();
    assert_eq!(outcome.text, "back to normal");

    // a turn cancelled mid-append may orphan its user line, so only the
    // error entry and the recovered turn are asserted here
    let lines = harness.session_lines(controller.session_id().await);
    let types = entry_types(&lines);
    assert!(types.contains(&"error"));
    assert_eq!(&types[types.len() - 2..], ["user", "assistant"]);
    let tail = &lines[lines.len() - 2..];
    assert_eq!(tail[1]["parentUuid"], tail[0]["uuid"]);
}

#[tokio::test]
async fn clear_keeps_the_journal_chain_intact() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new()
        .script_no_tool()
        .script_text("one")
        .script_no_tool()
        .script_text("two");
    let controller = harness.controller(provider, test_config()).await;

    controller.handle("first question").await.unwrap();
    controller.clear_context().await.unwrap();
    controller.handle("second question").await.unwrap();

    let lines = harness.session_lines(controller.session_id().await);
    assert_eq!(
        entry_types(&lines),
        ["user", "assistant", "command", "user", "assistant"]
    );
    assert_chained(&lines);
    assert_eq!(lines[2]["message"]["content"], "clear");
}

#[tokio::test]
async fn resume_method_switches_sessions_and_journals_the_command() {
    let harness = Harness::new();
    let provider = ScriptedProvider::new().script_no_tool().script_text("hello");
    let controller = harness.controller(provider, test_config()).await;
    controller.handle("hi").await.unwrap();
    let original = controller.session_id().await;

    let side = controller
        .resume(SessionTarget::Name("side".into()))
        .await
        .unwrap();
    assert_ne!(side, original);
    assert_eq!(controller.session_id().await, side);

    let lines = harness.session_lines(side);
    assert_eq!(entry_types(&lines), ["command"]);
    assert_eq!(
        lines[0]["message"]["content"],
        format!("resume {side}")
    );

    let summaries = controller.list_sessions().await.unwrap();
    assert_eq!(summaries.len(), 2);
}

#[tokio::test]
async fn resume_replays_the_conversation() {
    let harness = Harness::new();
    let session_id = {
        let provider = ScriptedProvider::new().script_no_tool().script_text("blue");
        let controller = harness.controller(provider, test_config()).await;
        controller.handle("favorite color?").await.unwrap();
        controller.session_id().await
    };

    let provider = ScriptedProvider::new().script_no_tool().script_text("as I said, blue");
    let sandbox = Sandbox::new(harness.sandbox_dir.path()).unwrap();
    let controller = Controller::new(
        provider,
        sandbox,
        harness.layout.clone(),
        SessionTarget::Id(session_id),
        test_config(),
    )
    .await
    .unwrap();
    assert_eq!(controller.session_id().await, session_id);

    controller.handle("what did you say?").await.unwrap();
    let lines = harness.session_lines(session_id);
    // original pair, then the resumed turn's pair, one unbroken chain
    assert_eq!(
        entry_types(&lines),
        ["user", "assistant", "user", "assistant"]
    );
    assert_chained(&lines);
}

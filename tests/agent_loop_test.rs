//! AgentLoop 集成测试：脚本化 LLM + 临时工作目录

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use codeagent::config::AppConfig;
use codeagent::core::{AgentBuilder, AgentComponents, AgentError, TaskStatus};
use codeagent::llm::{LlmError, RetryConfig, RetryingLlmClient, ScriptedLlmClient};
use codeagent::memory::{Message, Role, ToolCallRequest};
use codeagent::react::{AgentEvent, AgentLoop};

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCallRequest {
    ToolCallRequest::new(id, name, args.to_string())
}

fn tool_turn(calls: Vec<ToolCallRequest>) -> Message {
    Message::assistant_with_tool_calls(None, calls)
}

fn components(
    dir: &tempfile::TempDir,
    config: AppConfig,
    llm: Arc<ScriptedLlmClient>,
) -> Arc<AgentComponents> {
    AgentBuilder::new(config, dir.path().to_path_buf())
        .with_system_prompt("You are a test agent.")
        .build_components_with_llm(llm)
}

fn drain(rx: &mut UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test]
async fn test_tool_calls_dispatched_in_order_with_events() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), "alpha").unwrap();
    let llm = Arc::new(ScriptedLlmClient::replies(vec![
        tool_turn(vec![
            call("c1", "read_file", json!({"path": "a.txt"})),
            call("c2", "nonexistent", json!({})),
        ]),
        Message::assistant("The file says alpha."),
    ]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm.clone()), false);
    let (tx, mut rx) = unbounded_channel();

    let answer = agent.run("What is in a.txt?", Some(&tx)).await.unwrap();
    assert_eq!(answer, "The file says alpha.");

    let history = agent.session().messages();
    let roles: Vec<Role> = history.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::Tool, Role::Tool, Role::Assistant]
    );
    assert_eq!(history[3].tool_call_id.as_deref(), Some("c1"));
    assert_eq!(history[3].text(), "alpha");
    assert_eq!(history[4].tool_call_id.as_deref(), Some("c2"));
    assert!(history[4].text().starts_with("Error:"));
    assert!(history[4].text().contains("not found"));

    let events = drain(&mut rx);
    assert_eq!(events.len(), 4);
    assert_eq!(
        events[0],
        AgentEvent::DispatchStarted { count: 2, names: vec!["read_file".into(), "nonexistent".into()] }
    );
    assert!(matches!(&events[1], AgentEvent::ToolOutput { tool_call_id, .. } if tool_call_id == "c1"));
    assert!(matches!(&events[2], AgentEvent::ToolOutput { tool_call_id, .. } if tool_call_id == "c2"));
    assert_eq!(events[3], AgentEvent::Answer { text: "The file says alpha.".into() });

    // 第二次请求能看到两条工具结果；根 Agent 不带计划工具
    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].messages.len(), 5);
    assert!(requests[0].tool_names.contains(&"submit_task".to_string()));
    assert!(!requests[0].tool_names.contains(&"plan_task".to_string()));
}

#[tokio::test]
async fn test_file_reference_injected_into_user_message() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("src")).unwrap();
    std::fs::write(dir.path().join("src/lib.rs"), "pub fn answer() -> u32 { 42 }").unwrap();
    let llm = Arc::new(ScriptedLlmClient::replies(vec![Message::assistant("It returns 42.")]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm), false);

    agent.run("Explain @file:src/lib.rs", None).await.unwrap();
    let user = &agent.session().messages()[1];
    assert!(user.text().starts_with("Explain @file:src/lib.rs"));
    assert!(user.text().contains("<File path=\"src/lib.rs\">"));
    assert!(user.text().contains("pub fn answer()"));
}

#[tokio::test]
async fn test_delegation_runs_nested_loop_with_context() {
    let dir = tempfile::tempdir().unwrap();
    // 根调用 -> 子 Agent 调用 -> 根最终回复
    let llm = Arc::new(ScriptedLlmClient::replies(vec![
        tool_turn(vec![call(
            "d1",
            "submit_task",
            json!({
                "goal": "Count the modules",
                "context_summary": "The crate lives in src/",
                "hints": ["look at lib.rs"]
            }),
        )]),
        Message::assistant("There are 3 modules."),
        Message::assistant("Sub-agent reports 3 modules."),
    ]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm.clone()), false);

    let answer = agent.run("How many modules?", None).await.unwrap();
    assert_eq!(answer, "Sub-agent reports 3 modules.");
    assert_eq!(agent.session().messages()[3].text(), "There are 3 modules.");

    let child = &llm.requests()[1];
    assert_eq!(child.messages[0].role, Role::System);
    assert!(child.messages[0].text().contains("Count the modules"));
    assert_eq!(child.messages[1].role, Role::System);
    assert!(child.messages[1].text().contains("The crate lives in src/"));
    assert_eq!(child.messages[2].role, Role::User);
    assert!(child.messages[2].text().contains("Hints:\n- look at lib.rs"));
    // 子 Agent 到达深度上限，看不到委派工具，也没有计划工具
    assert!(!child.tool_names.contains(&"submit_task".to_string()));
    assert!(!child.tool_names.contains(&"plan_task".to_string()));
    assert!(child.tool_names.contains(&"read_file".to_string()));
}

#[tokio::test]
async fn test_plan_mode_records_delegated_task_and_enriches_result() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::replies(vec![
        tool_turn(vec![call(
            "p1",
            "plan_task",
            json!({"tasks": [
                {"id": "1", "description": "Read the config"},
                {"id": "2", "description": "Fix the bug", "dependencies": ["1"]}
            ]}),
        )]),
        tool_turn(vec![call("s1", "submit_task", json!({"goal": "Read the config", "task_id": "1"}))]),
        Message::assistant("Config uses TOML."),
        Message::assistant("Task 1 done, task 2 next."),
    ]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm.clone()), true);

    agent.run("Fix the config bug", None).await.unwrap();

    assert!(llm.requests()[0].tool_names.contains(&"plan_task".to_string()));
    assert!(agent.session().messages()[0].text().contains("Plan Mode"));

    let task = agent.tasks().get_task("1").unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result.as_deref(), Some("Config uses TOML."));

    let observed = agent
        .session()
        .messages()
        .iter()
        .find(|m| m.tool_call_id.as_deref() == Some("s1"))
        .unwrap()
        .text()
        .to_string();
    assert!(observed.starts_with("Config uses TOML."));
    assert!(observed.contains("Next eligible task: 2 - Fix the bug"));
    assert!(observed.contains("[X] Task 1: Read the config"));
    assert!(observed.contains("[ ] Task 2: Fix the bug (Deps: 1)"));
}

#[tokio::test]
async fn test_sub_agent_failure_becomes_error_result_and_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        Ok(tool_turn(vec![call("p1", "plan_task", json!({"tasks": [{"id": "a", "description": "Try"}]}))])),
        Ok(tool_turn(vec![call("s1", "submit_task", json!({"goal": "Try", "task_id": "a"}))])),
        Err(LlmError::Fatal("401 unauthorized".into())),
        Ok(Message::assistant("Task a failed.")),
    ]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm), true);

    let answer = agent.run("Try it", None).await.unwrap();
    assert_eq!(answer, "Task a failed.");

    let task = agent.tasks().get_task("a").unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("sub-agent failed"));

    let observed = agent.session().messages()[5].text().to_string();
    assert!(observed.starts_with("Error: sub-agent failed"));
    assert!(observed.contains("No eligible task remaining."));
}

#[tokio::test]
async fn test_retry_exhaustion_aborts_turn() {
    let dir = tempfile::tempdir().unwrap();
    let scripted = ScriptedLlmClient::new(vec![
        Err(LlmError::Transient("503".into())),
        Err(LlmError::Transient("503".into())),
        Err(LlmError::Transient("503".into())),
    ]);
    let retry = RetryConfig { max_attempts: 3, initial_backoff_ms: 1, max_backoff_ms: 2 };
    let llm = Arc::new(RetryingLlmClient::new(scripted, retry));
    let components = AgentBuilder::new(AppConfig::default(), dir.path().to_path_buf())
        .build_components_with_llm(llm.clone());
    let mut agent = AgentLoop::new(components, false);

    let err = agent.run("hello", None).await.unwrap_err();
    assert!(matches!(err, AgentError::Llm(LlmError::Transient(_))));
    assert_eq!(llm.inner().call_count(), 3);
    // 用户消息已入历史，没有半截的 assistant 消息
    assert_eq!(agent.session().len(), 2);
}

#[tokio::test]
async fn test_step_limit_returns_notice() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.app.max_steps = 2;
    let llm = Arc::new(ScriptedLlmClient::replies(vec![
        tool_turn(vec![call("l1", "list_dir", json!({}))]),
        tool_turn(vec![call("l2", "list_dir", json!({}))]),
    ]));
    let mut agent = AgentLoop::new(components(&dir, config, llm.clone()), false);

    let answer = agent.run("loop forever", None).await.unwrap();
    assert!(answer.contains("step limit (2)"));
    assert_eq!(llm.call_count(), 2);
    assert!(agent.session().messages().iter().all(Message::is_well_formed));
}

#[tokio::test]
async fn test_cancelled_before_model_call() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::replies(vec![Message::assistant("unused")]));
    let mut agent = AgentLoop::new(components(&dir, AppConfig::default(), llm.clone()), false);
    agent.cancel_token().cancel();

    let err = agent.run("hi", None).await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(llm.call_count(), 0);

    agent.renew_cancel_token();
    assert_eq!(agent.run("hi again", None).await.unwrap(), "unused");
}

#[tokio::test]
async fn test_compaction_inside_loop_emits_event() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.session.max_tokens = 200;
    config.session.reserved_output_tokens = 0;
    config.session.preserve_count = 1;
    let llm = Arc::new(ScriptedLlmClient::replies(vec![
        Message::assistant("first"),
        Message::assistant("SUMMARY of turn one"),
        Message::assistant("second"),
    ]));
    let comps = AgentBuilder::new(config, dir.path().to_path_buf())
        .with_system_prompt("sys")
        .build_components_with_llm(llm.clone());
    let mut agent = AgentLoop::new(comps, false);
    let (tx, mut rx) = unbounded_channel();

    // 每条约 100 token：第一轮低于阈值，第二轮触发压缩
    agent.run(&"a".repeat(400), Some(&tx)).await.unwrap();
    assert!(drain(&mut rx).iter().all(|e| !matches!(e, AgentEvent::Compacted { .. })));

    let answer = agent.run(&"b".repeat(400), Some(&tx)).await.unwrap();
    assert_eq!(answer, "second");
    let events = drain(&mut rx);
    assert_eq!(events[0], AgentEvent::Compacted { removed: 2 });

    let history = agent.session().messages();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].text(), "sys");
    assert!(history[1].text().contains("SUMMARY of turn one"));
    assert!(history[2].text().starts_with("bbbb"));
    assert_eq!(history[3].text(), "second");

    // 摘要请求不带工具
    assert!(llm.requests()[1].tool_names.is_empty());
}

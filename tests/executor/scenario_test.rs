//! End-to-end scenarios mirroring how a chat front end drives the relay.

use std::time::{Duration, Instant};

use claude_relay::config::GateConfig;
use claude_relay::executor::{ChannelListener, ErrorCategory, ExecuteRequest, Executor, StreamUpdate};
use claude_relay::gate::RequestGate;

use super::scripted;

const HELLO_SCRIPT: &str = r#"
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"Hello"}]}}'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"tool_use","id":"t1","name":"Read","input":{"file_path":"README.md"}}]}}'
printf '%s\n' '{"type":"tool_result","tool_use_id":"t1","is_error":false}'
printf '%s\n' '{"type":"result","subtype":"success","session_id":"abc","total_cost_usd":0.01,"num_turns":2}'
"#;

#[tokio::test]
async fn hello_with_one_tool_call() {
    let executor = Executor::new(scripted(HELLO_SCRIPT));
    let (listener, mut rx) = ChannelListener::new(16);

    let response = executor
        .execute(&ExecuteRequest::new("say hello"), Some(&listener))
        .await
        .unwrap();

    assert_eq!(response.content, "Hello");
    assert_eq!(response.session_id, "abc");
    assert!((response.cost_usd - 0.01).abs() < 1e-9);
    assert_eq!(response.tools_used.len(), 1);
    assert_eq!(response.tools_used[0].name, "Read");
    assert_eq!(response.tools_used[0].input["file_path"], "README.md");
    assert!(!response.is_error);

    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    assert_eq!(updates.len(), 4);
    assert_eq!(updates[0].content(), Some("Hello"));
    assert_eq!(updates[1].tool_names(), vec!["Read"]);
    match &updates[2] {
        StreamUpdate::ToolResult {
            tool_use_id,
            metadata,
            ..
        } => {
            assert_eq!(tool_use_id.as_deref(), Some("t1"));
            assert_eq!(metadata["is_error"], false);
        }
        other => panic!("Expected ToolResult, got {other:?}"),
    }
    match &updates[3] {
        StreamUpdate::TerminalResult { summary, .. } => {
            assert_eq!(summary.session_id, "abc");
            assert!(!summary.is_error);
        }
        other => panic!("Expected TerminalResult, got {other:?}"),
    }
}

#[tokio::test]
async fn resumed_session_passes_flags_to_child() {
    // The child echoes back the flags it was given as assistant text.
    let script = r#"printf '{"type":"assistant","content":[{"type":"text","text":"%s %s"}]}\n' "$1" "$2""#;
    let executor = Executor::new(scripted(script));

    let response = executor
        .execute(&ExecuteRequest::new("again").resume("abc"), None)
        .await
        .unwrap();

    assert_eq!(response.content, "--resume abc");
}

#[tokio::test]
async fn disk_full_failure() {
    let script = r#"
printf '%s\n' '{"type":"assistant","content":[{"type":"text","text":"partial"}]}'
echo "disk full" >&2
exit 1
"#;
    let executor = Executor::new(scripted(script));

    let response = executor
        .execute(&ExecuteRequest::new("write it"), None)
        .await
        .unwrap();

    assert!(response.is_error);
    assert_eq!(response.error_category, Some(ErrorCategory::ProcessError));
    assert!(response.content.starts_with("Error: disk full"));
    assert_eq!(response.session_id, "");
}

#[tokio::test]
async fn last_result_record_wins() {
    let script = r#"
printf '%s\n' '{"type":"result","session_id":"first","total_cost_usd":0.5}'
printf '%s\n' '{"type":"assistant","content":[{"type":"text","text":"more"}]}'
printf '%s\n' '{"type":"result","session_id":"second","cost_usd":0.75}'
"#;
    let executor = Executor::new(scripted(script));

    let response = executor
        .execute(&ExecuteRequest::new("go"), None)
        .await
        .unwrap();

    assert_eq!(response.session_id, "second");
    assert!((response.cost_usd - 0.75).abs() < f64::EPSILON);
    assert_eq!(response.content, "more");
}

#[tokio::test]
async fn slow_child_times_out_with_category() {
    let executor = Executor::new(scripted("exec sleep 30")).timeout(Duration::from_millis(200));

    let err = executor
        .execute(&ExecuteRequest::new("go"), None)
        .await
        .unwrap_err();

    assert_eq!(err.category(), Some(ErrorCategory::Timeout));
}

#[test]
fn eleventh_request_in_window_is_rejected() {
    let gate = RequestGate::from_config(&GateConfig::default());
    let start = Instant::now();

    for i in 0..10 {
        assert!(
            gate.check_at("user-1", start + Duration::from_secs(i)),
            "request {i} should pass"
        );
    }
    assert!(!gate.check_at("user-1", start + Duration::from_secs(10)));
    assert!(gate.check_at("user-2", start + Duration::from_secs(10)));

    // Once the first request leaves the window one slot opens again.
    assert!(gate.check_at("user-1", start + Duration::from_secs(61)));
    assert!(!gate.check_at("user-1", start + Duration::from_secs(61)));
}

//! Tests for Claude process spawning and control.

use claude_relay::cli::{ClaudeProcess, ClaudeProcessBuilder, SpawnError};

const NO_PREFIX: [&str; 0] = [];

#[test]
fn builder_new_creates_with_prompt() {
    let args = ClaudeProcessBuilder::new("Fix the bug").build_args();

    assert!(args.contains(&"-p".to_string()));
    assert!(args.contains(&"Fix the bug".to_string()));
    assert!(args.contains(&"--output-format".to_string()));
    assert!(args.contains(&"stream-json".to_string()));
}

#[test]
fn builder_allowed_tools() {
    let args = ClaudeProcessBuilder::new("task")
        .allowed_tools(&["Read", "Write", "Bash"])
        .build_args();

    assert!(args.contains(&"--allowedTools".to_string()));
    assert!(args.contains(&"Read,Write,Bash".to_string()));
}

#[test]
fn builder_max_turns_and_verbose() {
    let args = ClaudeProcessBuilder::new("task")
        .max_turns(5)
        .verbose(true)
        .build_args();

    assert!(args.contains(&"--max-turns".to_string()));
    assert!(args.contains(&"5".to_string()));
    assert!(args.contains(&"--verbose".to_string()));
}

#[test]
fn builder_is_clone() {
    let builder = ClaudeProcessBuilder::new("task").max_turns(5).resume("s");
    let cloned = builder.clone();

    assert_eq!(builder.build_args(), cloned.build_args());
}

#[test]
fn builder_working_dir() {
    use std::path::PathBuf;

    let builder = ClaudeProcessBuilder::new("task").working_dir("/tmp/project");
    assert_eq!(
        builder.get_working_dir(),
        Some(&PathBuf::from("/tmp/project"))
    );
    assert!(ClaudeProcessBuilder::new("task").get_working_dir().is_none());
}

#[tokio::test]
async fn spawn_missing_binary_is_not_found() {
    let builder = ClaudeProcessBuilder::new("task");
    let err =
        ClaudeProcess::spawn_with_binary("/nonexistent/claude-relay-bin", &NO_PREFIX, &builder)
            .unwrap_err();

    assert!(matches!(err, SpawnError::NotFound(_)), "got {err:?}");
}

#[tokio::test]
async fn spawn_echo_and_wait() {
    let builder = ClaudeProcessBuilder::new("ignored");
    let mut process = ClaudeProcess::spawn_with_binary("echo", &NO_PREFIX, &builder).unwrap();

    assert!(process.id().is_some());
    let status = process.wait().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn take_stdout_and_stderr_once() {
    let builder = ClaudeProcessBuilder::new("hello");
    let mut process = ClaudeProcess::spawn_with_binary("echo", &NO_PREFIX, &builder).unwrap();

    assert!(process.take_stdout().is_some());
    assert!(process.take_stdout().is_none());
    assert!(process.take_stderr().is_some());
    assert!(process.take_stderr().is_none());

    process.wait().await.unwrap();
}

#[tokio::test]
async fn prefix_args_come_first() {
    use tokio::io::AsyncReadExt;

    let builder = ClaudeProcessBuilder::new("the prompt");
    let script = r#"printf '%s %s\n' "$1" "$2""#;
    let mut process =
        ClaudeProcess::spawn_with_binary("sh", &["-c", script, "claude"], &builder).unwrap();

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();
    process.wait().await.unwrap();

    assert_eq!(output.trim(), "-p the prompt");
}

#[tokio::test]
async fn kill_running_process() {
    let builder = ClaudeProcessBuilder::new("ignored");
    let mut process =
        ClaudeProcess::spawn_with_binary("sh", &["-c", "exec sleep 10", "claude"], &builder)
            .unwrap();

    assert!(process.kill().await.is_ok());
    let status = process.wait().await.unwrap();
    assert!(!status.success());
}

#[tokio::test]
async fn spawn_with_working_dir() {
    use tokio::io::AsyncReadExt;

    let temp_dir = tempfile::TempDir::new().unwrap();
    let temp_path = temp_dir.path().canonicalize().unwrap();

    let builder = ClaudeProcessBuilder::new("ignored").working_dir(&temp_path);
    let mut process =
        ClaudeProcess::spawn_with_binary("sh", &["-c", "pwd -P", "claude"], &builder).unwrap();

    let mut stdout = process.take_stdout().unwrap();
    let mut output = String::new();
    stdout.read_to_string(&mut output).await.unwrap();
    process.wait().await.unwrap();

    assert_eq!(output.trim(), temp_path.to_str().unwrap());
}

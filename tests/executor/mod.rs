//! Executor module tests.

mod scenario_test;

use claude_relay::config::ExecutorConfig;

/// Executor config whose child is `sh -c <script>` instead of the real CLI.
///
/// The generated Claude flags land in the script's positional parameters and
/// are ignored.
pub fn scripted(script: &str) -> ExecutorConfig {
    ExecutorConfig {
        binary: "sh".to_string(),
        binary_args: vec!["-c".to_string(), script.to_string(), "claude".to_string()],
        ..ExecutorConfig::default()
    }
}

//! Process lifecycle management.
//!
//! [`Executor::execute`] owns one invocation end to end: spawn the child,
//! stream and classify its stdout, forward updates, wait for exit, and return
//! the aggregated response. The whole sequence runs under one wall-clock
//! budget; on expiry the child is killed and reaped.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::task::AbortOnDropHandle;

use crate::cli::{
    read_tail, BoundedLineReader, ClaudeProcess, ClaudeProcessBuilder, SpawnError, StreamParser,
};
use crate::config::ExecutorConfig;
use crate::executor::{
    classify, deliver, AggregatedResponse, ErrorCategory, InvocationId, InvocationRegistry,
    InvocationState, ProcessHandle, ResultAggregator, StreamUpdate, UpdateListener,
};

/// Upper bound on waiting for a killed child to be reaped.
pub const KILL_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes of standard error kept for error reports.
pub const STDERR_TAIL_BYTES: usize = 64 * 1024;

/// Error type for executor operations.
#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    /// The child could not be started.
    #[error("Failed to spawn Claude process: {0}")]
    Spawn(#[from] SpawnError),
    /// Process stdout was not available.
    #[error("Process stdout not available")]
    NoStdout,
    /// The wall-clock budget ran out and the child was killed.
    #[error("Claude Code timed out after {limit:?}")]
    Timeout { limit: Duration },
    /// The invocation was cancelled through the registry.
    #[error("Invocation {0} was cancelled")]
    Cancelled(InvocationId),
    /// Reading from or waiting on the child failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Response category for errors that have one.
    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Timeout { .. } => Some(ErrorCategory::Timeout),
            _ => None,
        }
    }
}

/// What the caller wants run.
#[derive(Debug, Clone, Default)]
pub struct ExecuteRequest {
    pub prompt: String,
    /// Overrides the configured working directory.
    pub working_dir: Option<PathBuf>,
    pub session_id: Option<String>,
    pub continue_session: bool,
}

impl ExecuteRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Continue the given session.
    #[must_use]
    pub fn resume(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self.continue_session = true;
        self
    }

    #[must_use]
    pub fn continue_session(mut self, enabled: bool) -> Self {
        self.continue_session = enabled;
        self
    }
}

/// How the guarded section ended.
enum Outcome {
    Finished(Result<AggregatedResponse, ExecutorError>),
    TimedOut,
    Cancelled,
}

/// Runs Claude Code invocations.
///
/// Cheap to share behind an `Arc`; concurrent invocations only meet in the
/// registry.
#[derive(Debug)]
pub struct Executor {
    config: ExecutorConfig,
    timeout: Duration,
    registry: Arc<InvocationRegistry>,
}

impl Executor {
    #[must_use]
    pub fn new(config: ExecutorConfig) -> Self {
        Self::with_registry(config, Arc::new(InvocationRegistry::new()))
    }

    /// Create an executor that records invocations in a shared registry.
    #[must_use]
    pub fn with_registry(config: ExecutorConfig, registry: Arc<InvocationRegistry>) -> Self {
        Self {
            timeout: Duration::from_secs(config.timeout_secs),
            config,
            registry,
        }
    }

    /// Override the wall-clock budget with sub-second precision.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn registry(&self) -> Arc<InvocationRegistry> {
        Arc::clone(&self.registry)
    }

    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Build the child's argument vector for a request.
    #[must_use]
    pub fn build_process(&self, request: &ExecuteRequest) -> ClaudeProcessBuilder {
        let mut builder = ClaudeProcessBuilder::new(request.prompt.as_str())
            .continue_session(request.continue_session)
            .max_turns(self.config.max_turns)
            .verbose(self.config.verbose)
            .allowed_tools(self.config.allowed_tools.as_slice())
            .working_dir(
                request
                    .working_dir
                    .clone()
                    .unwrap_or_else(|| self.config.working_dir.clone()),
            );
        if let Some(session_id) = &request.session_id {
            builder = builder.resume(session_id.as_str());
        }
        builder
    }

    /// Run one invocation to completion.
    ///
    /// A non-zero exit is reported as an error-flagged response, not an
    /// `Err`. The invocation is removed from the registry on every path.
    ///
    /// # Errors
    ///
    /// Returns `ExecutorError::Timeout` when the budget runs out,
    /// `ExecutorError::Cancelled` when cancelled through the registry, and
    /// spawn or I/O errors otherwise.
    pub async fn execute(
        &self,
        request: &ExecuteRequest,
        listener: Option<&dyn UpdateListener>,
    ) -> Result<AggregatedResponse, ExecutorError> {
        let id = InvocationId::new();
        let started = Instant::now();
        let deadline = tokio::time::Instant::now().checked_add(self.timeout);
        if deadline.is_none() {
            tracing::warn!(
                invocation_id = %id,
                timeout = ?self.timeout,
                "Timeout out of range, running without a deadline"
            );
        }
        let builder = self.build_process(request);

        tracing::info!(
            invocation_id = %id,
            working_dir = ?builder.get_working_dir(),
            resume = request.session_id.is_some(),
            "Starting Claude Code process"
        );

        let mut process =
            ClaudeProcess::spawn_with_binary(&self.config.binary, &self.config.binary_args, &builder)?;

        let handle = ProcessHandle::new(id, process.id());
        let cancel = handle.cancellation_token();
        let registration = self.registry.register(handle);
        registration.set_state(InvocationState::Running);

        let outcome = tokio::select! {
            biased;

            () = cancel.cancelled() => Outcome::Cancelled,
            result = within(deadline, self.drive(&mut process, id, listener)) => {
                match result {
                    Some(finished) => Outcome::Finished(finished),
                    None => Outcome::TimedOut,
                }
            }
        };

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Outcome::Finished(Ok(response)) => {
                registration.set_state(if response.is_error {
                    InvocationState::Failed
                } else {
                    InvocationState::Completed
                });
                tracing::info!(
                    invocation_id = %id,
                    cost_usd = response.cost_usd,
                    duration_ms = elapsed_ms,
                    tools = response.tools_used.len(),
                    is_error = response.is_error,
                    "Claude Code process finished"
                );
                Ok(response.with_duration_ms(elapsed_ms))
            }
            Outcome::Finished(Err(e)) => {
                registration.set_state(InvocationState::Failed);
                tracing::error!(invocation_id = %id, error = %e, "Claude Code process failed");
                kill_and_reap(&mut process, id).await;
                Err(e)
            }
            Outcome::TimedOut => {
                registration.set_state(InvocationState::TimedOut);
                kill_and_reap(&mut process, id).await;
                let limit = self.timeout;
                tracing::error!(invocation_id = %id, timeout = ?limit, "Claude Code timed out");
                Err(ExecutorError::Timeout { limit })
            }
            Outcome::Cancelled => {
                registration.set_state(InvocationState::Failed);
                kill_and_reap(&mut process, id).await;
                tracing::warn!(invocation_id = %id, "Claude Code invocation cancelled");
                Err(ExecutorError::Cancelled(id))
            }
        }
    }

    /// Stream stdout to exhaustion, then wait for the exit status.
    async fn drive(
        &self,
        process: &mut ClaudeProcess,
        id: InvocationId,
        listener: Option<&dyn UpdateListener>,
    ) -> Result<AggregatedResponse, ExecutorError> {
        let stdout = process.take_stdout().ok_or(ExecutorError::NoStdout)?;
        let stderr_tail = process
            .take_stderr()
            .map(|stderr| AbortOnDropHandle::new(tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES))));

        let lines = BoundedLineReader::with_chunk_size(stdout, self.config.chunk_size)
            .max_line_bytes(self.config.max_line_bytes)
            .into_stream();
        tokio::pin!(lines);
        let mut aggregator = ResultAggregator::new(self.config.history_capacity);

        while let Some(line) = lines.next().await {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match StreamParser::parse_line(&line) {
                Ok(parsed) => {
                    aggregator.observe(&parsed);
                    let Some(update) = classify(&parsed) else {
                        continue;
                    };
                    if let Some(listener) = listener.filter(|_| update.is_forwarded()) {
                        deliver(listener, &update).await;
                    }
                }
                Err(e) => {
                    tracing::warn!(invocation_id = %id, error = %e, "Skipping malformed stream record");
                    aggregator.record_diagnostic(e.to_string());
                }
            }
        }

        if aggregator.diagnostic_count() > 0 {
            tracing::warn!(
                invocation_id = %id,
                count = aggregator.diagnostic_count(),
                "Encountered parsing errors"
            );
        }

        let status = process.wait().await?;
        if status.success() {
            return Ok(aggregator.finish());
        }

        let stderr = match stderr_tail {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        tracing::error!(
            invocation_id = %id,
            code = ?status.code(),
            stderr = %stderr.trim_end(),
            "Claude Code exited with failure"
        );

        let mut response = AggregatedResponse::process_error(&stderr);
        response.diagnostics = aggregator.diagnostic_count();
        if let Some(listener) = listener {
            let update = StreamUpdate::Error {
                content: response.content.clone(),
            };
            deliver(listener, &update).await;
        }
        Ok(response)
    }
}

/// Run `future` to completion, or until `deadline` passes.
///
/// Returns `None` on expiry. Without a deadline the future runs unbounded.
async fn within<F: Future>(
    deadline: Option<tokio::time::Instant>,
    future: F,
) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, future).await.ok(),
        None => Some(future.await),
    }
}

/// Kill the child and wait a bounded time for it to be reaped.
async fn kill_and_reap(process: &mut ClaudeProcess, id: InvocationId) {
    match tokio::time::timeout(KILL_WAIT_TIMEOUT, process.kill()).await {
        Ok(Ok(())) => tracing::debug!(invocation_id = %id, "Child process killed"),
        Ok(Err(e)) => tracing::debug!(invocation_id = %id, error = %e, "Kill failed, child likely exited"),
        Err(_) => tracing::warn!(invocation_id = %id, "Child did not exit after kill"),
    }
}

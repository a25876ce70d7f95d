// Command sequence runner
// Runs steps in order on one session, aborting on the first failure unless told to continue

use crate::application::executor::classify::{CommandClassifier, StreamLimits};
use crate::application::executor::command::{run_pooled, CommandOutcome, CommandRequest};
use crate::config::ExecutorConfig;
use crate::domain::{SequenceSpec, StepResult};
use crate::error::AppError;
use crate::port::RemoteSession;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOutcome {
    pub steps: Vec<StepResult>,
    /// `step N failed: ...` when a failing step stopped the run
    pub aborted: Option<String>,
}

impl SequenceOutcome {
    /// Step outputs joined under `[N] command` headers
    pub fn combined_output(&self) -> String {
        self.steps
            .iter()
            .map(|step| {
                let body = match (&step.error, step.output.is_empty()) {
                    (Some(error), true) => error.clone(),
                    _ => step.output.clone(),
                };
                format!("[{}] {}\n{}", step.step, step.command, body)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Failure text for a command that ran but did not succeed
pub(super) fn failure_message(outcome: &CommandOutcome) -> String {
    let mut message = match (outcome.exit_code, &outcome.signal) {
        (Some(code), _) => AppError::CommandFailed(code).to_string(),
        (None, Some(signal)) => format!("Command killed by signal {}", signal),
        (None, None) => "Command ended without an exit status".to_string(),
    };
    if !outcome.stderr.is_empty() {
        message.push_str(": ");
        message.push_str(&outcome.stderr);
    }
    message
}

pub async fn run_sequence(
    session: &dyn RemoteSession,
    spec: &SequenceSpec,
    config: &ExecutorConfig,
    classifier: &CommandClassifier,
) -> SequenceOutcome {
    let limits = StreamLimits {
        lines: config.stream_lines,
        timeout: config.stream_timeout,
    };
    let mut steps = Vec::with_capacity(spec.commands.len());

    for (index, step) in spec.commands.iter().enumerate() {
        let number = index + 1;
        let timeout = step
            .timeout_secs
            .or(spec.timeout_secs)
            .map(Duration::from_secs)
            .unwrap_or(config.command_timeout);
        let request = CommandRequest {
            command: classifier
                .rewrite(&step.command, false, limits)
                .unwrap_or_else(|| step.command.clone()),
            pty: false,
            auto_respond: false,
            responses: BTreeMap::new(),
            max_lines: config.max_lines,
            timeout,
            interrupt_grace: config.interrupt_grace,
        };

        debug!(step = number, command = %step.command, "Running sequence step");
        let result = match run_pooled(session, &request, classifier).await {
            Ok(outcome) => {
                let success = outcome.succeeded();
                StepResult {
                    step: number,
                    command: step.command.clone(),
                    success,
                    exit_code: outcome.exit_code,
                    error: (!success).then(|| failure_message(&outcome)),
                    output: outcome.output,
                    stderr: outcome.stderr,
                    duration_ms: outcome.duration_ms,
                }
            }
            Err(e) => StepResult {
                step: number,
                command: step.command.clone(),
                success: false,
                exit_code: None,
                output: String::new(),
                stderr: String::new(),
                error: Some(e.to_string()),
                duration_ms: 0,
            },
        };

        let failed = !result.success;
        let error = result.error.clone().unwrap_or_default();
        steps.push(result);

        if failed {
            if spec.continue_on_error || step.continue_on_error {
                warn!(step = number, error = %error, "Sequence step failed, continuing");
                continue;
            }
            return SequenceOutcome {
                steps,
                aborted: Some(format!("step {} failed: {}", number, error)),
            };
        }
    }

    SequenceOutcome {
        steps,
        aborted: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{SequenceStep, ServerConfig};
    use crate::port::transport::mocks::{MockReply, MockTransport};
    use crate::port::{ConnectOptions, RemoteTransport};
    use std::sync::Arc;

    async fn session(transport: &MockTransport) -> Arc<dyn RemoteSession> {
        let options = ConnectOptions {
            connect_timeout: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(30),
        };
        transport
            .connect(&ServerConfig::new("h", "u").with_password("p"), &options)
            .await
            .unwrap()
    }

    fn spec(steps: Vec<SequenceStep>, continue_on_error: bool) -> SequenceSpec {
        SequenceSpec {
            commands: steps,
            continue_on_error,
            timeout_secs: None,
        }
    }

    #[tokio::test]
    async fn test_all_steps_run() {
        let transport = MockTransport::new();
        let session = session(&transport).await;
        let outcome = run_sequence(
            session.as_ref(),
            &spec(vec![SequenceStep::new("echo one"), SequenceStep::new("echo two")], false),
            &ExecutorConfig::default(),
            &CommandClassifier::builtin(),
        )
        .await;

        assert_eq!(outcome.aborted, None);
        assert_eq!(outcome.steps.len(), 2);
        assert!(outcome.steps.iter().all(|s| s.success));
        assert_eq!(outcome.combined_output(), "[1] echo one\none\n[2] echo two\ntwo");
    }

    #[tokio::test]
    async fn test_first_failure_aborts() {
        let transport = MockTransport::new();
        transport.reply("false", MockReply::exit(1, "nope"));
        let session = session(&transport).await;
        let outcome = run_sequence(
            session.as_ref(),
            &spec(vec![SequenceStep::new("false"), SequenceStep::new("echo after")], false),
            &ExecutorConfig::default(),
            &CommandClassifier::builtin(),
        )
        .await;

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(
            outcome.aborted.as_deref(),
            Some("step 1 failed: Command exited with code 1: nope")
        );
        assert_eq!(transport.executed(), vec!["false".to_string()]);
    }

    #[tokio::test]
    async fn test_step_level_continue_on_error() {
        let transport = MockTransport::new();
        transport.reply("false", MockReply::exit(2, ""));
        let session = session(&transport).await;
        let mut failing = SequenceStep::new("false");
        failing.continue_on_error = true;

        let outcome = run_sequence(
            session.as_ref(),
            &spec(vec![failing, SequenceStep::new("echo after")], false),
            &ExecutorConfig::default(),
            &CommandClassifier::builtin(),
        )
        .await;

        assert_eq!(outcome.aborted, None);
        assert_eq!(outcome.steps.len(), 2);
        assert!(!outcome.steps[0].success);
        assert_eq!(outcome.steps[0].exit_code, Some(2));
        assert!(outcome.steps[1].success);
    }

    #[tokio::test]
    async fn test_broken_session_fails_step() {
        let transport = MockTransport::new();
        let session = session(&transport).await;
        transport.sessions()[0].break_connection();

        let outcome = run_sequence(
            session.as_ref(),
            &spec(vec![SequenceStep::new("echo x")], true),
            &ExecutorConfig::default(),
            &CommandClassifier::builtin(),
        )
        .await;
        assert_eq!(outcome.steps.len(), 1);
        assert!(outcome.steps[0].error.is_some());
    }

    #[tokio::test]
    async fn test_killed_step_reports_signal() {
        let transport = MockTransport::new();
        transport.reply("./migrate.sh", MockReply::killed("KILL"));
        let session = session(&transport).await;
        let outcome = run_sequence(
            session.as_ref(),
            &spec(vec![SequenceStep::new("./migrate.sh"), SequenceStep::new("echo after")], false),
            &ExecutorConfig::default(),
            &CommandClassifier::builtin(),
        )
        .await;

        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(outcome.steps[0].exit_code, None);
        assert_eq!(
            outcome.aborted.as_deref(),
            Some("step 1 failed: Command killed by signal KILL")
        );
    }
}

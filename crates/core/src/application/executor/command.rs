// Remote command runners
// Pooled exec with line cap and timeout, dedicated shell with prompt handling

use crate::application::constants::{CTRL_C, MARKER_PREFIX, MARKER_SUFFIX, TIMEOUT_EXIT_CODE};
use crate::application::executor::classify::CommandClassifier;
use crate::error::Result;
use crate::port::{ChannelEvent, RemoteChannel, RemoteSession};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, warn};

/// A command ready to run on a pooled session
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub command: String,
    pub pty: bool,
    pub auto_respond: bool,
    pub responses: BTreeMap<String, String>,
    pub max_lines: usize,
    pub timeout: Duration,
    pub interrupt_grace: Duration,
}

/// What a pooled command produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub output: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    /// Signal that ended the remote process, when it did not exit on its own
    pub signal: Option<String>,
    pub line_count: usize,
    pub timed_out: bool,
    pub truncated: bool,
    pub duration_ms: i64,
}

impl CommandOutcome {
    /// Exit 0 and the timeout sentinel succeed; so does output cut off by the line cap
    pub fn succeeded(&self) -> bool {
        match self.exit_code {
            Some(0) | Some(TIMEOUT_EXIT_CODE) => true,
            Some(_) => false,
            None => self.truncated,
        }
    }
}

/// Run one command over an exec channel
///
/// Output is accumulated until the channel closes. Reaching `max_lines` or the
/// timeout sends an interrupt, then force-closes after the grace period.
pub async fn run_pooled(
    session: &dyn RemoteSession,
    request: &CommandRequest,
    classifier: &CommandClassifier,
) -> Result<CommandOutcome> {
    let started = Instant::now();
    let mut channel = session.exec(&request.command, request.pty).await?;

    let deadline = started + request.timeout;
    let mut grace_deadline: Option<Instant> = None;
    let mut output = String::new();
    let mut stderr = String::new();
    let mut line_count = 0usize;
    let mut exit_code = None;
    let mut signal = None;
    let mut timed_out = false;
    let mut truncated = false;
    let mut responded = false;

    loop {
        let limit = grace_deadline.unwrap_or(deadline);
        tokio::select! {
            event = channel.next_event() => match event {
                Some(ChannelEvent::Stdout(chunk)) => {
                    line_count += chunk.matches('\n').count();
                    output.push_str(&chunk);

                    if grace_deadline.is_none() && line_count >= request.max_lines {
                        debug!(line_count, max_lines = request.max_lines, "Line cap reached, interrupting");
                        truncated = true;
                        interrupt(channel.as_mut()).await;
                        grace_deadline = Some(Instant::now() + request.interrupt_grace);
                    }

                    if request.auto_respond && !responded {
                        if let Some((pattern, response)) = classifier.match_prompt(pending_line(&output), &request.responses) {
                            debug!(pattern, "Answering prompt");
                            let reply = format!("{}\n", response);
                            if let Err(e) = channel.write(reply.as_bytes()).await {
                                warn!(error = %e, "Cannot answer prompt");
                            }
                            responded = true;
                        }
                    }
                }
                Some(ChannelEvent::Stderr(chunk)) => stderr.push_str(&chunk),
                Some(ChannelEvent::Exit(code)) => exit_code = Some(code),
                Some(ChannelEvent::Signal(name)) => signal = Some(name),
                None => break,
            },
            _ = sleep_until(limit) => {
                if grace_deadline.is_none() {
                    debug!(timeout_ms = request.timeout.as_millis() as u64, "Command timed out, interrupting");
                    timed_out = true;
                    interrupt(channel.as_mut()).await;
                    grace_deadline = Some(Instant::now() + request.interrupt_grace);
                } else {
                    if let Err(e) = channel.close().await {
                        debug!(error = %e, "Force close after interrupt failed");
                    }
                    break;
                }
            }
        }
    }

    if timed_out {
        exit_code = Some(TIMEOUT_EXIT_CODE);
    }

    Ok(CommandOutcome {
        output: output.trim().to_string(),
        stderr: stderr.trim().to_string(),
        exit_code,
        signal,
        line_count,
        timed_out,
        truncated,
        duration_ms: started.elapsed().as_millis() as i64,
    })
}

async fn interrupt(channel: &mut dyn RemoteChannel) {
    if let Err(e) = channel.interrupt().await {
        debug!(error = %e, "Interrupt signal rejected, sending Ctrl+C");
        if let Err(e) = channel.write(CTRL_C).await {
            debug!(error = %e, "Ctrl+C write failed");
        }
    }
}

/// Text after the last newline: where a waiting prompt sits
fn pending_line(output: &str) -> &str {
    output.rsplit('\n').next().unwrap_or_default()
}

/// A command typed into a dedicated shell
#[derive(Debug, Clone)]
pub struct InteractiveRequest {
    pub job_id: String,
    pub command: String,
    pub auto_respond: bool,
    pub responses: BTreeMap<String, String>,
    pub timeout: Duration,
    pub marker_delay: Duration,
    /// With `auto_respond`, silence after which the marker is sent without a prompt
    pub quiet_period: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractiveEnd {
    /// Completion marker seen
    Completed,
    /// Channel closed before the marker
    Closed,
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractiveOutcome {
    pub output: String,
    pub end: InteractiveEnd,
    pub responded_to: Option<String>,
    pub duration_ms: i64,
}

/// The marker as it appears in output
pub fn completion_marker(job_id: &str) -> String {
    format!("{}{}{}__", MARKER_PREFIX, MARKER_SUFFIX, job_id)
}

/// Shell line printing the marker from two halves, so its echo never contains it
fn marker_command(job_id: &str) -> String {
    format!(
        "printf '%s%s\\n' '{}' '{}{}__'; exit\n",
        MARKER_PREFIX, MARKER_SUFFIX, job_id
    )
}

/// Type a command into a shell, answer at most one prompt, wait for the marker
///
/// Without `auto_respond` the marker follows the command right away. With it, the
/// marker follows the first answered prompt, or `quiet_period` of silence.
pub async fn run_interactive(
    session: &dyn RemoteSession,
    request: &InteractiveRequest,
    classifier: &CommandClassifier,
) -> Result<InteractiveOutcome> {
    let started = Instant::now();
    let deadline = started + request.timeout;
    let marker = completion_marker(&request.job_id);
    let marker_line = marker_command(&request.job_id);
    let typed = request.command.trim();

    let mut channel = session.shell().await?;
    channel
        .write(format!("{}\n", request.command).as_bytes())
        .await?;
    if !request.auto_respond {
        channel.write(marker_line.as_bytes()).await?;
    }

    let mut output = String::new();
    let mut responded_to = None;
    let mut marker_sent = !request.auto_respond;
    let mut quiet_deadline = Instant::now() + request.quiet_period;

    let end = loop {
        tokio::select! {
            event = channel.next_event() => match event {
                Some(ChannelEvent::Stdout(chunk)) => {
                    output.push_str(&chunk);
                    quiet_deadline = Instant::now() + request.quiet_period;
                    if output.contains(&marker) {
                        break InteractiveEnd::Completed;
                    }
                    if marker_sent {
                        continue;
                    }
                    // a partial echo of the typed command is not a prompt
                    let line = pending_line(&output).trim();
                    if line.is_empty() || typed.starts_with(line) {
                        continue;
                    }
                    if let Some((pattern, response)) = classifier.match_prompt(line, &request.responses) {
                        debug!(job_id = %request.job_id, pattern, "Answering interactive prompt");
                        channel.write(format!("{}\n", response).as_bytes()).await?;
                        responded_to = Some(pattern.to_string());
                        sleep(request.marker_delay).await;
                        channel.write(marker_line.as_bytes()).await?;
                        marker_sent = true;
                    }
                }
                Some(ChannelEvent::Stderr(chunk)) => {
                    output.push_str("[STDERR] ");
                    output.push_str(&chunk);
                    quiet_deadline = Instant::now() + request.quiet_period;
                }
                Some(ChannelEvent::Exit(_)) | Some(ChannelEvent::Signal(_)) => {}
                None => break InteractiveEnd::Closed,
            },
            _ = sleep_until(quiet_deadline), if !marker_sent => {
                debug!(job_id = %request.job_id, "No prompt seen, sending completion marker");
                channel.write(marker_line.as_bytes()).await?;
                marker_sent = true;
            }
            _ = sleep_until(deadline) => break InteractiveEnd::TimedOut,
        }
    };

    if let Err(e) = channel.close().await {
        debug!(error = %e, "Shell channel already closed");
    }

    Ok(InteractiveOutcome {
        output: output.replace(&marker, "").trim().to_string(),
        end,
        responded_to,
        duration_ms: started.elapsed().as_millis() as i64,
    })
}

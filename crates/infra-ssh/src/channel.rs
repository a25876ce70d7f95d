// SSH Channel
// Maps russh channel messages to stdout/stderr/exit/signal events

use async_trait::async_trait;
use orchestrator_core::port::{ChannelEvent, RemoteChannel, TransportError, TransportResult};
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Sig};
use tracing::debug;

/// SSH extended-data stream number for stderr
const EXTENDED_STDERR: u32 = 1;

/// Decode `chunk` after any bytes held back from the previous call
///
/// An incomplete multi-byte sequence at the end is kept in `pending`.
fn decode(pending: &mut Vec<u8>, chunk: &[u8]) -> String {
    pending.extend_from_slice(chunk);
    let valid = match std::str::from_utf8(pending) {
        Ok(_) => pending.len(),
        Err(e) if e.error_len().is_none() => e.valid_up_to(),
        Err(_) => pending.len(),
    };
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

/// `TERM`, `KILL`, ... or the raw name of a non-standard signal
fn signal_name(signal: &Sig) -> String {
    match signal {
        Sig::Custom(name) => name.clone(),
        other => format!("{:?}", other),
    }
}

pub struct SshChannel {
    channel: Channel<Msg>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    closed: bool,
}

impl SshChannel {
    pub(crate) fn new(channel: Channel<Msg>) -> Self {
        Self {
            channel,
            stdout: Vec::new(),
            stderr: Vec::new(),
            closed: false,
        }
    }
}

#[async_trait]
impl RemoteChannel for SshChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        while !self.closed {
            match self.channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    let text = decode(&mut self.stdout, &data);
                    if !text.is_empty() {
                        return Some(ChannelEvent::Stdout(text));
                    }
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == EXTENDED_STDERR => {
                    let text = decode(&mut self.stderr, &data);
                    if !text.is_empty() {
                        return Some(ChannelEvent::Stderr(text));
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    return Some(ChannelEvent::Exit(exit_status as i32));
                }
                Some(ChannelMsg::ExitSignal { signal_name: signal, error_message, .. }) => {
                    let name = signal_name(&signal);
                    debug!(signal = %name, error_message = %error_message, "Remote process killed");
                    return Some(ChannelEvent::Signal(name));
                }
                Some(ChannelMsg::Close) | None => self.closed = true,
                Some(_) => {}
            }
        }
        None
    }

    async fn write(&mut self, data: &[u8]) -> TransportResult<()> {
        self.channel
            .data(data)
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }

    async fn interrupt(&mut self) -> TransportResult<()> {
        debug!("Sending SIGINT");
        self.channel
            .signal(Sig::INT)
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }

    async fn close(&mut self) -> TransportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Err(e) = self.channel.eof().await {
            debug!(error = %e, "Sending EOF before close failed");
        }
        self.channel
            .close()
            .await
            .map_err(|e| TransportError::Channel(e.to_string()))
    }
}

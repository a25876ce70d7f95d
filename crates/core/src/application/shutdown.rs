// Maintenance Stop Signal
// One sender owned by the lifecycle, one token per background loop

use tokio::sync::watch;
use tracing::debug;

/// Read side handed to each maintenance loop
#[derive(Clone)]
pub struct ShutdownToken {
    stopped: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.stopped.borrow()
    }

    /// Resolves once stop was requested or the lifecycle dropped its sender
    pub async fn wait(&mut self) {
        if self.stopped.wait_for(|stopped| *stopped).await.is_err() {
            debug!("Stop sender dropped, treating as shutdown");
        }
    }
}

/// Write side kept by the lifecycle between `start` and `shutdown`
pub struct ShutdownSender {
    stop: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Stops every loop; returns how many tokens were still listening
    pub fn shutdown(&self) -> usize {
        self.stop.send_replace(true);
        self.stop.receiver_count()
    }
}

pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (stop, stopped) = watch::channel(false);
    (ShutdownSender { stop }, ShutdownToken { stopped })
}

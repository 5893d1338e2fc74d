//! Ephemeral status messages surfaced to the UI.
//!
//! A shown message auto-dismisses after a fixed delay. There is no queue:
//! showing a new message while one is visible overwrites the text and resets
//! the timer. Observers watch the channel; nothing here persists.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::trace;

/// How long a message stays visible.
const DISMISS_DELAY_SECS: u64 = 3;

/// A transient status message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedbackMessage {
    pub text: String,
    pub visible: bool,
}

/// Auto-dismissing feedback channel.
///
/// Must be used from within a tokio runtime: `show` spawns the dismiss
/// timer.
pub struct FeedbackChannel {
    state: Arc<watch::Sender<FeedbackMessage>>,
    hide_task: Mutex<Option<JoinHandle<()>>>,
    dismiss_delay: Duration,
}

impl FeedbackChannel {
    /// Creates a channel with the standard 3 second dismiss delay.
    #[must_use]
    pub fn new() -> Self {
        Self::with_delay(Duration::from_secs(DISMISS_DELAY_SECS))
    }

    /// Creates a channel with a custom dismiss delay.
    #[must_use]
    pub fn with_delay(dismiss_delay: Duration) -> Self {
        let (tx, _rx) = watch::channel(FeedbackMessage::default());
        Self {
            state: Arc::new(tx),
            hide_task: Mutex::new(None),
            dismiss_delay,
        }
    }

    /// Shows `text`, replacing any message currently visible and resetting
    /// the dismiss timer.
    pub fn show(&self, text: impl Into<String>) {
        let text = text.into();
        trace!(text = %text, "Showing feedback");

        self.state.send_replace(FeedbackMessage {
            text,
            visible: true,
        });

        let state = Arc::clone(&self.state);
        let delay = self.dismiss_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send_modify(|message| message.visible = false);
        });

        // The timer restarts with every message.
        let mut hide_task = self.hide_task.lock().expect("feedback lock poisoned");
        if let Some(previous) = hide_task.replace(handle) {
            previous.abort();
        }
    }

    /// Hides the current message immediately.
    pub fn hide(&self) {
        if let Some(task) = self.hide_task.lock().expect("feedback lock poisoned").take() {
            task.abort();
        }
        self.state.send_modify(|message| message.visible = false);
    }

    /// Returns the current message.
    #[must_use]
    pub fn current(&self) -> FeedbackMessage {
        self.state.borrow().clone()
    }

    /// Subscribes to message changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FeedbackMessage> {
        self.state.subscribe()
    }
}

impl Default for FeedbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

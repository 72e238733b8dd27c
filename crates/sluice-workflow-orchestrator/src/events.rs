//! Run events and notifiers for observability.
//!
//! Events are emitted while a workflow runs so consumers can follow progress,
//! persist state or stream it elsewhere.

use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
  RunStarted {
    run_id: String,
    workflow: String,
  },

  StepStarted {
    run_id: String,
    step: String,
  },

  StepCompleted {
    run_id: String,
    step: String,
    output: serde_json::Value,
  },

  StepFailed {
    run_id: String,
    step: String,
    error: String,
  },

  /// A step never started because the run stopped first.
  StepSkipped {
    run_id: String,
    step: String,
  },

  RunCompleted {
    run_id: String,
  },

  RunFailed {
    run_id: String,
    step: String,
    error: String,
  },
}

/// Receives run events.
///
/// Called from executor tasks, possibly concurrently; implementations must
/// not block.
pub trait RunNotifier: Send + Sync + 'static {
  fn notify(&self, event: RunEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl RunNotifier for NoopNotifier {
  fn notify(&self, _event: RunEvent) {}
}

/// Forwards events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<RunEvent>) -> Self {
    Self { sender }
  }

  /// Create a notifier together with its receiving end.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (Self::new(sender), receiver)
  }
}

impl RunNotifier for ChannelNotifier {
  fn notify(&self, event: RunEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

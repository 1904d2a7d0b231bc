use crate::context::Context;
use mockall::automock;
use std::sync::mpsc::Receiver;
use thiserror::Error;

/// A trigger that polls the remote periodically.
pub mod interval;
/// A trigger that updates on incoming webhook requests.
pub mod webhook;

/// A custom error for describing the error cases for triggers
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TriggerError {
    /// Cannot initialize trigger, because it has a misconfiguration.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// The trigger can only be started once.
    #[error("trigger is already started")]
    AlreadyStarted,
    /// Cannot start or keep the listener running. The parameters are the address and the error.
    #[error("cannot listen on {0}: {1}")]
    ListenFailed(String, String),
    /// A webhook request was refused, the status is sent back to the caller.
    #[error("request rejected with status {status}: {reason}")]
    Rejected { status: u16, reason: String },
    /// The context was cancelled, the trigger stops.
    #[error("trigger cancelled")]
    Cancelled,
}

/// An event sent by the triggers.
///
/// Both variants ask for an update, but a failed event also carries the trigger's
/// own error, so the receiver can decide whether to act on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerEvent {
    Update,
    Failed(TriggerError),
}

impl TriggerEvent {
    /// The error of a failed event.
    pub fn error(&self) -> Option<&TriggerError> {
        match self {
            TriggerEvent::Update => None,
            TriggerEvent::Failed(err) => Some(err),
        }
    }
}

/// A trigger is a long running background process, which initiates the updates.
///
/// Triggers may include:
///   - intervals ([interval::IntervalTrigger])
///   - webhooks ([webhook::WebhookTrigger])
///
/// The returned stream is closed when the context is cancelled or the trigger
/// fails irrecoverably.
#[automock]
pub trait Trigger: Send {
    /// Start the trigger process in the background and return its events.
    fn start(&mut self, context: &Context) -> Result<Receiver<TriggerEvent>, TriggerError>;
}

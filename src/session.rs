use crate::{
    commands::{RunError, Runner},
    context::Context,
    repository::{SyncError, Synchronizer},
    triggers::{Trigger, TriggerError, TriggerEvent},
};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use thiserror::Error;

/// What to do with the failed events of the trigger (e.g. a rejected webhook).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorEventPolicy {
    /// Log the error and wait for the next event.
    #[default]
    Skip,
    /// Log the error and update anyway.
    Update,
}

/// When to run the commands after an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CommandPolicy {
    /// After every successful update, even if nothing changed.
    #[default]
    Always,
    /// Only if the update changed the working tree.
    OnChange,
}

/// The behaviour of a session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionOptions {
    /// Run the commands once right after the setup.
    pub run_commands_on_setup: bool,
    pub error_events: ErrorEventPolicy,
    pub commands: CommandPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            run_commands_on_setup: true,
            error_events: ErrorEventPolicy::default(),
            commands: CommandPolicy::default(),
        }
    }
}

/// A custom error describing why a session stopped.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The repository cannot be set up, the session never becomes ready.
    #[error("setup failed: {0}")]
    Setup(SyncError),
    /// The trigger cannot be started.
    #[error("trigger failed: {0}")]
    Trigger(#[from] TriggerError),
    /// The thread of the session cannot be started or it panicked.
    #[error("session thread failed: {0}")]
    ThreadFailed(String),
}

/// A cloneable handle to a session, for collaborators (e.g. HTTP handlers)
/// that need to update or run the commands outside of the trigger loop.
///
/// The synchronizer is behind a mutex, so updates never overlap.
#[derive(Clone)]
pub struct SessionHandle {
    name: String,
    synchronizer: Arc<Mutex<Box<dyn Synchronizer>>>,
    runner: Arc<dyn Runner>,
    readiness: Arc<AtomicBool>,
}

impl SessionHandle {
    fn lock(&self) -> MutexGuard<'_, Box<dyn Synchronizer>> {
        self.synchronizer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Set up the repository, the session is ready afterwards.
    pub fn setup(&self, context: &Context) -> Result<(), SyncError> {
        self.lock().setup(context)?;
        self.readiness.store(true, Ordering::Release);
        info!("[{}] Repository is ready.", self.name);

        Ok(())
    }

    /// Update the repository. Returns true if the working tree changed.
    pub fn update(&self, context: &Context) -> Result<bool, SyncError> {
        self.lock().update(context)
    }

    /// Run the commands.
    pub fn run(&self, context: &Context) -> Result<(), RunError> {
        self.runner.run(context)
    }

    /// Returns true after the repository is set up successfully.
    pub fn is_ready(&self) -> bool {
        self.readiness.load(Ordering::Acquire)
    }
}

/// A managed repository: a synchronizer, the commands to run after updates and
/// the trigger deciding when to update.
pub struct Session {
    handle: SessionHandle,
    trigger: Box<dyn Trigger>,
    options: SessionOptions,
}

impl Session {
    pub fn new(
        name: &str,
        synchronizer: Box<dyn Synchronizer>,
        runner: Box<dyn Runner>,
        trigger: Box<dyn Trigger>,
    ) -> Self {
        Session {
            handle: SessionHandle {
                name: name.to_string(),
                synchronizer: Arc::new(Mutex::new(synchronizer)),
                runner: Arc::from(runner),
                readiness: Arc::new(AtomicBool::new(false)),
            },
            trigger,
            options: SessionOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    /// Share the readiness flag with others, e.g. a webhook handler.
    pub fn with_readiness(mut self, readiness: Arc<AtomicBool>) -> Self {
        self.handle.readiness = readiness;
        self
    }

    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Returns true if the loop should go on.
    fn run_commands(&self, context: &Context) -> bool {
        match self.handle.run(context) {
            Ok(()) => true,
            Err(RunError::Cancelled) => {
                debug!("[{}] Commands cancelled.", self.name());
                false
            }
        }
    }

    /// Returns true if the event should be followed by an update.
    fn should_update(&self, event: &TriggerEvent) -> bool {
        match event.error() {
            None => true,
            Some(TriggerError::Cancelled) => false,
            Some(err) => match self.options.error_events {
                ErrorEventPolicy::Skip => {
                    warn!("[{}] Trigger failed: {err}, skipping.", self.name());
                    false
                }
                ErrorEventPolicy::Update => {
                    warn!("[{}] Trigger failed: {err}, updating anyway.", self.name());
                    true
                }
            },
        }
    }

    /// Set up the repository and update on every trigger event until the context is cancelled.
    ///
    /// Only the setup and the start of the trigger can fail, the errors of the
    /// updates are logged and the session waits for the next event.
    pub fn start(mut self, context: &Context) -> Result<(), SessionError> {
        let name = self.name().to_string();

        info!("[{name}] Setting up the repository.");
        self.handle.setup(context).map_err(SessionError::Setup)?;

        if self.options.run_commands_on_setup && !self.run_commands(context) {
            return Ok(());
        }

        let events = self.trigger.start(context)?;
        debug!("[{name}] Waiting on the trigger.");

        for event in events {
            if context.is_cancelled() {
                debug!("[{name}] Context cancelled, ignoring {event:?}.");
                break;
            }
            if !self.should_update(&event) {
                continue;
            }

            let changed = match self.handle.update(context) {
                Ok(changed) => changed,
                Err(SyncError::Cancelled) => break,
                Err(err) => {
                    error!("[{name}] Update failed: {err}.");
                    continue;
                }
            };

            if changed {
                info!("[{name}] There are updates, running commands.");
            } else if self.options.commands == CommandPolicy::OnChange {
                debug!("[{name}] There are no updates.");
                continue;
            }

            if !self.run_commands(context) {
                break;
            }
        }

        debug!("[{name}] Finished running.");
        Ok(())
    }
}

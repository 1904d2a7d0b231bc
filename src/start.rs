use crate::{
    context::Context,
    session::{Session, SessionError},
};
use log::{debug, error};
use std::thread;
use thiserror::Error;

/// A custom error implementation for the start function
#[derive(Debug, Error)]
pub enum StartError {
    #[error("You have to define at least one repository.")]
    NoSessions,
    #[error("{} session(s) failed: {}.", .0.len(), session_names(.0))]
    FailedSessions(Vec<(String, SessionError)>),
}

fn session_names(failures: &[(String, SessionError)]) -> String {
    failures
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// The main program loop, that runs every session in parallel until the context is cancelled.
///
/// Every session gets its own thread, a failing session doesn't stop the others.
/// Returns after all of the sessions stopped, with the list of the failed ones.
pub fn start(sessions: Vec<Session>, context: &Context) -> Result<(), StartError> {
    if sessions.is_empty() {
        return Err(StartError::NoSessions);
    }

    let mut failures: Vec<(String, SessionError)> = vec![];
    let mut threads = vec![];
    for session in sessions {
        let name = session.name().to_string();
        let context = context.clone();
        let spawned = thread::Builder::new().name(name.clone()).spawn({
            let name = name.clone();
            move || {
                let result = session.start(&context);
                if let Err(err) = &result {
                    error!("[{name}] Session failed: {err}.");
                }
                result
            }
        });

        match spawned {
            Ok(thread) => threads.push((name, thread)),
            Err(err) => {
                error!("[{name}] Cannot start session: {err}.");
                failures.push((name, SessionError::ThreadFailed(err.to_string())));
            }
        }
    }

    debug!("Waiting on {} session(s).", threads.len());
    for (name, thread) in threads {
        match thread.join() {
            Ok(Ok(())) => debug!("[{name}] Session stopped."),
            Ok(Err(err)) => failures.push((name, err)),
            Err(_) => {
                error!("[{name}] Session panicked.");
                failures.push((name, SessionError::ThreadFailed(String::from("panicked"))));
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(StartError::FailedSessions(failures))
    }
}

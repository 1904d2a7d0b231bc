use crate::context::Context;
use duct::{Expression, Handle};
use log::{debug, trace, warn};
use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    process::ExitStatus,
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MAX_OUTPUT_SIZE: u64 = 1024 * 1024;

/// How a waited process ended.
pub enum Exit {
    Finished(ExitStatus),
    Cancelled,
}

/// Start the expression as the leader of a new process group, so it can be
/// terminated with every process it spawned.
#[cfg(unix)]
pub fn in_new_group(expression: Expression) -> Expression {
    use std::os::unix::process::CommandExt;

    expression.before_spawn(|command| {
        command.process_group(0);
        Ok(())
    })
}

#[cfg(not(unix))]
pub fn in_new_group(expression: Expression) -> Expression {
    expression
}

/// The output of a command, written to an unnamed temporary file.
///
/// Nothing has to drain a file, so waiting on the process never blocks on
/// descendants that inherited the output.
pub struct OutputFile {
    file: File,
}

impl OutputFile {
    pub fn new() -> io::Result<Self> {
        Ok(OutputFile {
            file: tempfile::tempfile()?,
        })
    }

    /// Redirect both stdout and stderr of the expression into the file.
    pub fn redirect(&self, expression: Expression) -> io::Result<Expression> {
        Ok(expression
            .stderr_to_stdout()
            .stdout_file(self.file.try_clone()?))
    }

    /// Everything written so far, at most the first megabyte.
    pub fn read(&mut self) -> io::Result<String> {
        let mut output = vec![];
        self.file.seek(SeekFrom::Start(0))?;
        (&mut self.file)
            .take(MAX_OUTPUT_SIZE)
            .read_to_end(&mut output)?;

        Ok(String::from_utf8_lossy(&output).trim_end().to_string())
    }
}

#[cfg(unix)]
fn group_id(handle: &Handle) -> Option<nix::unistd::Pid> {
    let pid = handle.pids().first().copied()?;
    i32::try_from(pid).ok().map(nix::unistd::Pid::from_raw)
}

#[cfg(unix)]
fn signal_group(handle: &Handle, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;

    let Some(group) = group_id(handle) else {
        return;
    };
    match killpg(group, signal) {
        Ok(()) => trace!("Sent {signal} to process group {group}."),
        // The group already exited
        Err(nix::errno::Errno::ESRCH) => {}
        Err(err) => warn!("Cannot send {signal} to process group {group}: {err}."),
    }
}

/// Whether the leader or any process of its group is still running.
///
/// The exited leader is reaped here, otherwise it would keep the group alive as a zombie.
#[cfg(unix)]
fn is_running(handle: &Handle) -> bool {
    use nix::{errno::Errno, sys::signal::killpg};

    if matches!(handle.try_wait(), Ok(None)) {
        return true;
    }
    group_id(handle).map_or(false, |group| {
        !matches!(killpg(group, None), Err(Errno::ESRCH))
    })
}

#[cfg(not(unix))]
fn is_running(handle: &Handle) -> bool {
    matches!(handle.try_wait(), Ok(None))
}

/// Terminate the process group: SIGTERM first, SIGKILL if anything in it is still running after the grace period.
#[cfg(unix)]
pub fn terminate(handle: &Handle, grace: Duration) {
    use nix::sys::signal::Signal;

    signal_group(handle, Signal::SIGTERM);

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_running(handle) {
            return;
        }
        thread::sleep(POLL_INTERVAL);
    }

    debug!("Process group did not stop in {grace:?}, killing it.");
    signal_group(handle, Signal::SIGKILL);
    if let Err(err) = handle.wait() {
        debug!("Cannot reap the killed process: {err}.");
    }
}

#[cfg(not(unix))]
pub fn terminate(handle: &Handle, _grace: Duration) {
    if let Err(err) = handle.kill() {
        warn!("Cannot kill process: {err}.");
    }
}

/// Wait for the process to finish, terminating it if the context is cancelled first.
pub fn wait(handle: &Handle, context: &Context, grace: Duration) -> io::Result<Exit> {
    loop {
        if let Some(output) = handle.try_wait()? {
            return Ok(Exit::Finished(output.status));
        }
        if context.wait_timeout(POLL_INTERVAL) {
            debug!("Context cancelled, terminating the running command.");
            terminate(handle, grace);
            return Ok(Exit::Cancelled);
        }
    }
}

/// Leave the process group running in the background, but terminate it when the context is cancelled.
///
/// Returns immediately if nothing in the group is running anymore.
pub fn watch(handle: Handle, context: Context, grace: Duration) {
    if !is_running(&handle) {
        return;
    }

    thread::spawn(move || loop {
        if !is_running(&handle) {
            trace!("Background processes exited.");
            break;
        }
        if context.wait_timeout(POLL_INTERVAL) {
            debug!("Context cancelled, terminating the background processes.");
            terminate(&handle, grace);
            break;
        }
    });
}

use crate::context::Context;
use duct::{cmd, Expression};
use duct_sh::sh_dangerous;
use log::{debug, info, trace, warn};
use mockall::automock;
use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;

mod process;

/// The time a cancelled process group gets between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// A command to run after an update.
///
/// It is either an argument vector which is started directly, or a script
/// which is passed to the shell (`/bin/sh` on *nix, `cmd.exe` on Windows).
/// Async commands are started but not waited on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    args: Vec<String>,
    script: Option<String>,
    is_async: bool,
}

impl Command {
    /// Create a command from the argument vector.
    pub fn new(args: Vec<String>, is_async: bool) -> Self {
        Command {
            args,
            script: None,
            is_async,
        }
    }

    /// Parse a shell-like command line. A trailing `&` marks the command as async.
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut args =
            shlex::split(line).ok_or_else(|| CommandError::ParseFailed(line.to_string()))?;

        let is_async = args.last().map(|arg| arg == "&") == Some(true);
        if is_async {
            args.pop();
        }

        Ok(Command::new(args, is_async))
    }

    /// Create a command running the script in a shell. A trailing `&` marks it as async.
    pub fn shell(script: &str) -> Self {
        let script = script.trim();
        let (script, is_async) = match script.strip_suffix('&') {
            // A trailing `&&` is an unfinished shell expression, not a background marker.
            Some(rest) if !rest.ends_with('&') => (rest.trim_end(), true),
            _ => (script, false),
        };

        Command {
            args: vec![],
            script: Some(script.to_string()),
            is_async,
        }
    }

    /// Empty commands are skipped.
    pub fn is_empty(&self) -> bool {
        match &self.script {
            Some(script) => script.is_empty(),
            None => self.args.is_empty(),
        }
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn to_expression(&self) -> Option<Expression> {
        if let Some(script) = &self.script {
            // We can run `sh_dangerous`, because the script comes from the operator.
            return Some(sh_dangerous(script));
        }

        let (program, args) = self.args.split_first()?;

        // If we are not in a shell, test if the user might want to be in one (uses variables or pipes)
        let contains_variables = args.iter().any(|arg| {
            arg.find('$')
                .and_then(|pos| arg.chars().nth(pos + 1))
                .map(|ch| ch.is_ascii_alphabetic() || ch == '{')
                == Some(true)
        });
        let contains_suspicious = args
            .iter()
            .any(|arg| arg == "|" || arg == "&&" || arg == "||" || arg == ";");
        if contains_variables || contains_suspicious {
            warn!("The command {self} contains a variable or other shell-specific character: you might want to run it in a shell.");
        }

        let expression = cmd(program, args);
        trace!("Parsed {self} to {expression:?}.");

        Some(expression)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.script {
            Some(script) => write!(f, "{script:?}")?,
            None => write!(f, "{:?}", self.args.join(" "))?,
        }
        if self.is_async {
            write!(f, " (async)")?;
        }
        Ok(())
    }
}

/// An ordered list of commands, run strictly one after the other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandSet {
    commands: Vec<Command>,
}

impl CommandSet {
    pub fn new(commands: Vec<Command>) -> Self {
        CommandSet { commands }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.iter().all(Command::is_empty)
    }
}

impl FromIterator<Command> for CommandSet {
    fn from_iter<T: IntoIterator<Item = Command>>(iter: T) -> Self {
        CommandSet::new(iter.into_iter().collect())
    }
}

/// A custom error describing the failure of a single command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command line has unclosed quotes or escapes.
    #[error("cannot parse command {0:?}")]
    ParseFailed(String),
    /// The process cannot be started, usually because the program doesn't exist.
    #[error("the command cannot run: {0}")]
    SpawnFailed(String),
    /// The command returned a non-zero exit code. The parameters are the exit code and the output.
    #[error("the command returned non-zero exit code {0} with message: {1}")]
    NonZeroExitcode(i32, String),
}

/// A custom error for the whole run. Failed commands are reported to the observer instead.
#[derive(Debug, Error)]
pub enum RunError {
    /// The context was cancelled before or while running the commands.
    #[error("cancelled")]
    Cancelled,
}

/// A runner executes the configured commands after every update.
#[automock]
pub trait Runner: Send + Sync {
    fn run(&self, context: &Context) -> Result<(), RunError>;
}

/// Observer notified about the commands, by default it logs them.
pub trait CommandObserver: Send + Sync {
    /// Called before each command is started.
    fn on_start(&self, name: &str, command: &Command) {
        info!("[{name}] Running {command}.");
    }

    /// Called if a command failed, the rest of the commands still run.
    fn on_error(&self, name: &str, command: &Command, error: &CommandError) {
        warn!("[{name}] Command {command} failed: {error}.");
    }
}

/// The default observer, which logs through the `log` facade.
pub struct LogObserver;

impl CommandObserver for LogObserver {}

/// Runs a [CommandSet] in the repository directory.
///
/// Every command is started in its own process group with `CI=true`,
/// `GITDEPLOY_DIRECTORY` and `GITDEPLOY_REFERENCE` set. The commands are
/// best-effort: a failing command is reported to the observer and the next
/// command is started anyway. If the context is cancelled, the running process
/// group is terminated and the run returns [RunError::Cancelled].
pub struct CommandRunner {
    name: String,
    commands: CommandSet,
    directory: PathBuf,
    reference: String,
    observer: Box<dyn CommandObserver>,
    grace: Duration,
}

impl CommandRunner {
    /// Creates a runner for the commands, started in the given directory.
    pub fn new(name: &str, commands: CommandSet, directory: PathBuf, reference: &str) -> Self {
        CommandRunner {
            name: name.to_string(),
            commands,
            directory,
            reference: reference.to_string(),
            observer: Box::new(LogObserver),
            grace: DEFAULT_KILL_GRACE,
        }
    }

    /// Replace the observer notified about the commands.
    pub fn with_observer(mut self, observer: Box<dyn CommandObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the time between terminating and killing a cancelled process group.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    fn prepare(&self, expression: Expression) -> Expression {
        process::in_new_group(expression)
            .env("CI", "true")
            .env("GITDEPLOY_DIRECTORY", &self.directory)
            .env("GITDEPLOY_REFERENCE", &self.reference)
            .dir(&self.directory)
            .unchecked()
    }

    /// Start the command in the background, its output goes to our stdout and stderr.
    fn run_async(&self, expression: Expression, context: &Context) -> Result<(), CommandError> {
        let handle = self
            .prepare(expression)
            .start()
            .map_err(|err| CommandError::SpawnFailed(err.to_string()))?;
        process::watch(handle, context.clone(), self.grace);

        Ok(())
    }

    /// Run the command until its leader exits. Processes it left behind in the
    /// group are watched in the background and terminated on cancellation.
    fn run_sync(
        &self,
        command: &Command,
        expression: Expression,
        context: &Context,
    ) -> Result<process::Exit, CommandError> {
        let spawn_failed = |err: std::io::Error| CommandError::SpawnFailed(err.to_string());

        let mut output = process::OutputFile::new().map_err(spawn_failed)?;
        let handle = output
            .redirect(self.prepare(expression))
            .and_then(|expression| expression.start())
            .map_err(spawn_failed)?;

        let status = match process::wait(&handle, context, self.grace).map_err(spawn_failed)? {
            process::Exit::Finished(status) => status,
            process::Exit::Cancelled => return Ok(process::Exit::Cancelled),
        };
        process::watch(handle, context.clone(), self.grace);

        let text = output.read().unwrap_or_else(|err| {
            debug!("[{}] Cannot read the output of {command}: {err}.", self.name);
            String::new()
        });
        if !status.success() {
            return Err(CommandError::NonZeroExitcode(status.code().unwrap_or(-1), text));
        }

        debug!("[{}] Command {command} succeeded, output:", self.name);
        text.lines().for_each(|line| {
            debug!("{line}");
        });
        Ok(process::Exit::Finished(status))
    }

    fn run_command(&self, command: &Command, context: &Context) -> Result<(), RunError> {
        let Some(expression) = command.to_expression() else {
            return Ok(());
        };

        if command.is_async() {
            if let Err(error) = self.run_async(expression, context) {
                self.observer.on_error(&self.name, command, &error);
            }
            return Ok(());
        }

        match self.run_sync(command, expression, context) {
            Ok(process::Exit::Finished(_)) => Ok(()),
            Ok(process::Exit::Cancelled) => Err(RunError::Cancelled),
            Err(error) => {
                self.observer.on_error(&self.name, command, &error);
                Ok(())
            }
        }
    }
}

impl Runner for CommandRunner {
    fn run(&self, context: &Context) -> Result<(), RunError> {
        for command in self.commands.iter() {
            if command.is_empty() {
                continue;
            }
            if context.is_cancelled() {
                return Err(RunError::Cancelled);
            }

            self.observer.on_start(&self.name, command);
            self.run_command(command, context)?;
        }

        Ok(())
    }
}

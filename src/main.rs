use args::{parse_args, Args};
use gitdeploy::{
    commands::{Command, CommandError, CommandRunner, CommandSet},
    context::Context,
    repository::{GitSynchronizer, RepositoryConfig, SyncError},
    session::{CommandPolicy, ErrorEventPolicy, Session, SessionOptions},
    signal::SignalHandler,
    start::{start, StartError},
    triggers::{
        interval::IntervalTrigger,
        webhook::{GenericHook, HookConfig, RepositoryInfo, WebhookTrigger},
        Trigger, TriggerError,
    },
};
use log::{debug, error, SetLoggerError};
use logger::init_logger;
use std::{
    env,
    path::PathBuf,
    process,
    sync::{atomic::AtomicBool, Arc},
};
use thiserror::Error;

mod args;
mod logger;

#[derive(Debug, Error)]
pub enum MainError {
    #[error("You have to pass a repository URL.")]
    MissingUrl,
    #[error("Cannot set up the timezones for the logger.")]
    FailedLoggerTimezones,
    #[error(transparent)]
    FailedLogger(#[from] SetLoggerError),
    #[error(transparent)]
    Repository(#[from] SyncError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error(transparent)]
    Trigger(#[from] TriggerError),
    #[error(transparent)]
    Start(#[from] StartError),
}

fn create_commands(args: &Args) -> Result<CommandSet, CommandError> {
    args.commands
        .iter()
        .map(|command| {
            if args.shell {
                Ok(Command::shell(command))
            } else {
                Command::parse(command)
            }
        })
        .collect()
}

fn create_trigger(
    args: &Args,
    config: HookConfig,
    readiness: Arc<AtomicBool>,
) -> Result<Box<dyn Trigger>, TriggerError> {
    match &args.webhook {
        Some(address) => Ok(Box::new(WebhookTrigger::new(
            &args.webhook_path,
            Some(address.as_str()),
            Box::new(GenericHook),
            config,
            readiness,
        )?)),
        None => Ok(Box::new(IntervalTrigger::new(args.delay.clone().into())?)),
    }
}

fn main_inner(args: Args) -> Result<(), MainError> {
    let url = args.url.clone().ok_or(MainError::MissingUrl)?;

    let config = RepositoryConfig {
        remote: args.remote.clone(),
        branch: args.branch.clone().unwrap_or_default(),
        username: args.username.clone(),
        password: args
            .password
            .clone()
            .or_else(|| env::var("GITDEPLOY_PASSWORD").ok()),
        single_branch: args.single_branch,
        depth: args.depth,
        ..RepositoryConfig::new(&url, args.path.clone().map(PathBuf::from))
    };
    config.validate()?;
    debug!("Syncing {} into {}.", config.url, config.path.to_string_lossy());

    let synchronizer = GitSynchronizer::new(config.clone())?;
    let reference = synchronizer.reference().clone();
    let name = config.path.to_string_lossy().to_string();

    let runner = CommandRunner::new(
        &name,
        create_commands(&args)?,
        config.path.clone(),
        &reference.to_string(),
    );

    let readiness = Arc::new(AtomicBool::new(false));
    let hook_config = HookConfig {
        secret: args.secret.clone(),
        repository: RepositoryInfo::from(&reference),
    };
    let trigger = create_trigger(&args, hook_config, readiness.clone())?;

    let options = SessionOptions {
        run_commands_on_setup: !args.no_initial_run,
        error_events: if args.update_on_error {
            ErrorEventPolicy::Update
        } else {
            ErrorEventPolicy::Skip
        },
        commands: if args.on_change {
            CommandPolicy::OnChange
        } else {
            CommandPolicy::Always
        },
    };
    let session = Session::new(&name, Box::new(synchronizer), Box::new(runner), trigger)
        .with_options(options)
        .with_readiness(readiness);

    let context = Context::new();
    SignalHandler::new().listen(&context);

    start(vec![session], &context)?;

    Ok(())
}

fn main() {
    let args = parse_args();
    if args.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(err) = init_logger(&args) {
        eprintln!("{err}");
        process::exit(1);
    }

    if let Err(err) = main_inner(args) {
        error!("{err}");
        process::exit(1);
    }
}

use duration_string::DurationString;
use gumdrop::Options;

/// Keep a git repository in sync with a remote branch or tag and run commands on updates.
#[derive(Debug, Options)]
pub struct Args {
    /// The URL of the remote repository (http or https).
    #[options(free)]
    pub url: Option<String>,

    /// The directory of the checkout, defaults to the name of the repository.
    ///
    /// If it doesn't exist or it is empty, the repository is cloned into it.
    #[options()]
    pub path: Option<String>,

    /// The name of the remote.
    #[options(no_short, default = "origin")]
    pub remote: String,

    /// The branch or tag to follow (default: master).
    ///
    /// Can be a branch name, "tag|v1.0.0" for a fixed tag, "latest_tag|main"
    /// for the newest tag on a branch or "latest_commit|main".
    #[options()]
    pub branch: Option<String>,

    /// Username for authenticating to the remote.
    #[options()]
    pub username: Option<String>,

    /// Password or access token for authenticating to the remote.
    ///
    /// Can also be set with the GITDEPLOY_PASSWORD environment variable.
    #[options(no_short)]
    pub password: Option<String>,

    /// Only fetch the followed branch.
    #[options(no_short)]
    pub single_branch: bool,

    /// Only fetch this many commits, 0 fetches the full history.
    #[options(no_short, default = "0")]
    pub depth: u32,

    /// The command to run after updates, you can define multiple times.
    ///
    /// Finish it with " &" to start it in the background.
    #[options(long = "command")]
    pub commands: Vec<String>,

    /// Run the commands in a shell (/bin/sh on *nix, cmd.exe on Windows).
    #[options(short = "S")]
    pub shell: bool,

    /// Checks the remote with this delay, if there is no webhook.
    ///
    /// Can be a number postfixed with s(econd), m(inutes), h(ours), d(ays)
    #[options(long = "every", short = "e", default = "1h")]
    pub delay: DurationString,

    /// Listen for webhooks on this address instead of polling (e.g. "8080" or "127.0.0.1:8080").
    #[options(no_short)]
    pub webhook: Option<String>,

    /// Only accept webhooks on this path (e.g. "/deploy").
    #[options(no_short, default = "")]
    pub webhook_path: String,

    /// Require webhooks signed with this secret (X-Hub-Signature-256 or X-Hub-Signature).
    #[options(no_short)]
    pub secret: Option<String>,

    /// Don't run the commands right after the repository is set up.
    #[options(no_short)]
    pub no_initial_run: bool,

    /// Only run the commands if the update changed the checkout.
    #[options(no_short)]
    pub on_change: bool,

    /// Update even if the trigger reported an error (e.g. a rejected webhook).
    #[options(no_short)]
    pub update_on_error: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Only print error messages.
    #[options()]
    pub quiet: bool,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}

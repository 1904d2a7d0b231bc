use self::{
    config::{add_safe_directory, global_gitconfig},
    git::{shorthash, GitError, RepositoryHandle},
};
use crate::{
    context::Context,
    reference::{ReferenceError, ReferenceSpec},
};
use log::{debug, info, warn};
use mockall::automock;
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use thiserror::Error;
use url::Url;

mod config;
mod credentials;
/// The git operations on one checkout.
pub mod git;

pub use credentials::Credentials;

/// The remote name used when nothing else is configured.
pub const DEFAULT_REMOTE: &str = "origin";

/// The configuration of one synchronized repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// URL (HTTP or HTTPS) of the remote repository.
    pub url: String,
    /// Path of the checkout. If it doesn't exist or is empty, the repository is cloned here.
    pub path: PathBuf,
    /// Name of the remote, defaults to `origin`.
    pub remote: String,
    /// The branch or tag to follow, see [ReferenceSpec] for the format.
    pub branch: String,
    /// Username for basic authentication.
    pub username: Option<String>,
    /// Password or access token for basic authentication.
    pub password: Option<String>,
    /// Only fetch the followed branch.
    pub single_branch: bool,
    /// Number of commits to fetch, 0 fetches the full history.
    pub depth: u32,
    /// The gitconfig created with the checkout as a safe directory, if it doesn't exist.
    /// Defaults to the global gitconfig, `None` leaves the git configuration alone.
    pub safe_directory_config: Option<PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        RepositoryConfig {
            url: String::new(),
            path: PathBuf::new(),
            remote: DEFAULT_REMOTE.to_string(),
            branch: String::new(),
            username: None,
            password: None,
            single_branch: false,
            depth: 0,
            safe_directory_config: global_gitconfig(),
        }
    }
}

impl RepositoryConfig {
    /// Create a configuration for the URL. A missing path is derived from the URL,
    /// if that fails too it is left empty and [RepositoryConfig::validate] rejects it.
    pub fn new(url: &str, path: Option<PathBuf>) -> Self {
        let path = path
            .filter(|path| !path.as_os_str().is_empty())
            .or_else(|| RepositoryConfig::path_from_url(url))
            .unwrap_or_default();

        RepositoryConfig {
            url: url.to_string(),
            path,
            ..RepositoryConfig::default()
        }
    }

    /// The name of the repository from the URL (e.g. `https://host/user/site.git` is `site`).
    pub fn path_from_url(url: &str) -> Option<PathBuf> {
        let url = Url::parse(url).ok()?;
        let name = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
        let name = name.strip_suffix(".git").unwrap_or(name);
        if name.is_empty() {
            None
        } else {
            Some(PathBuf::from(name))
        }
    }

    /// The basic authentication credentials, if configured.
    pub fn credentials(&self) -> Option<Credentials> {
        Credentials::from_parts(self.username.as_deref(), self.password.as_deref())
    }

    /// Check that the URL and path can be used.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.url.is_empty() {
            return Err(SyncError::Misconfigured(String::from(
                "cannot create repository with empty URL",
            )));
        }

        let url = Url::parse(&self.url)
            .map_err(|err| SyncError::Misconfigured(format!("invalid url {}: {err}", self.url)))?;
        match url.scheme() {
            "http" | "https" => {}
            scheme => {
                return Err(SyncError::Misconfigured(format!(
                    "url scheme {scheme:?} not supported, use http or https"
                )))
            }
        }

        if self.path.as_os_str().is_empty() {
            return Err(SyncError::Misconfigured(String::from(
                "cannot create repository in empty path",
            )));
        }

        if self.remote.is_empty() {
            return Err(SyncError::Misconfigured(String::from(
                "remote name cannot be empty",
            )));
        }

        Ok(())
    }
}

/// A custom error describing the error cases for the synchronization.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The configured branch or tag cannot be parsed.
    #[error(transparent)]
    InvalidReference(#[from] ReferenceError),
    /// The configuration cannot be used.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// The path is neither empty nor a repository.
    #[error("{0} is neither empty nor a git repository")]
    NotAGitDirectory(String),
    /// Cloning or opening the repository failed.
    #[error("setup failed: {0}")]
    SetupFailed(String),
    /// Fetching or checking out an update failed, it can be retried.
    #[error("update failed: {0}")]
    UpdateFailed(String),
    /// There was no tag on the followed branch.
    #[error("no tag found on branch {0}")]
    NoTagFound(String),
    /// Update was called before a successful setup.
    #[error("repository is not set up")]
    NotSetUp,
    /// The operation was interrupted by the context.
    #[error("cancelled")]
    Cancelled,
}

impl SyncError {
    fn setup(err: GitError) -> Self {
        match err {
            GitError::NotAGitDirectory(path) => SyncError::NotAGitDirectory(path),
            GitError::Cancelled => SyncError::Cancelled,
            err => SyncError::SetupFailed(err.to_string()),
        }
    }

    fn update(err: GitError) -> Self {
        match err {
            GitError::NoTagFound(branch) => SyncError::NoTagFound(branch),
            GitError::Cancelled => SyncError::Cancelled,
            err => SyncError::UpdateFailed(err.to_string()),
        }
    }
}

/// A synchronizer keeps one checkout in sync with its remote.
#[automock]
pub trait Synchronizer: Send {
    /// Clone or open the repository and check out the reference. Runs once at startup.
    fn setup(&mut self, context: &Context) -> Result<(), SyncError>;
    /// Fetch and check out the newest version of the reference.
    /// Returns true if the working tree changed.
    fn update(&mut self, context: &Context) -> Result<bool, SyncError>;
}

#[derive(Debug, PartialEq, Eq)]
enum DirectoryState {
    Missing,
    Empty,
    NotEmpty,
}

fn directory_state(path: &Path) -> Result<DirectoryState, GitError> {
    let unreadable = |err: std::io::Error| {
        GitError::OpenFailed(path.to_string_lossy().to_string(), err.to_string())
    };

    match fs::metadata(path) {
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(DirectoryState::Missing),
        Err(err) => return Err(unreadable(err)),
        Ok(metadata) if !metadata.is_dir() => return Ok(DirectoryState::NotEmpty),
        Ok(_) => {}
    }

    let mut entries = fs::read_dir(path).map_err(unreadable)?;
    if entries.next().is_none() {
        Ok(DirectoryState::Empty)
    } else {
        Ok(DirectoryState::NotEmpty)
    }
}

/// A synchronizer backed by a git repository on disk.
pub struct GitSynchronizer {
    config: RepositoryConfig,
    reference: ReferenceSpec,
    repository: Option<RepositoryHandle>,
}

impl GitSynchronizer {
    /// Create the synchronizer, resolving the configured reference.
    pub fn new(config: RepositoryConfig) -> Result<Self, SyncError> {
        let reference = ReferenceSpec::resolve(&config.branch)?;

        Ok(GitSynchronizer {
            config,
            reference,
            repository: None,
        })
    }

    /// The resolved reference.
    pub fn reference(&self) -> &ReferenceSpec {
        &self.reference
    }

    /// The configuration of the repository.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    fn setup_inner(&self, context: &Context) -> Result<RepositoryHandle, GitError> {
        let Self {
            config, reference, ..
        } = self;
        let path = config.path.to_string_lossy().to_string();

        if let Some(gitconfig) = &config.safe_directory_config {
            if let Err(err) = add_safe_directory(gitconfig, &config.path) {
                warn!("Cannot set {path} as a safe directory: {err}.");
            }
        }

        match RepositoryHandle::open(config) {
            Ok(repository) => {
                info!(
                    "Found repository in {path}, pointing {} to {}.",
                    config.remote, config.url
                );
                repository.set_remote(&config.url, reference)?;
                repository.fetch(context)?;
                repository.checkout(reference)?;
                Ok(repository)
            }
            Err(GitError::NotARepository(_)) => match directory_state(&config.path)? {
                DirectoryState::Missing | DirectoryState::Empty => {
                    info!("Cloning {} into {path} on {reference}.", config.url);
                    RepositoryHandle::clone_remote(config, reference, context)
                }
                DirectoryState::NotEmpty => Err(GitError::NotAGitDirectory(path)),
            },
            Err(err) => Err(err),
        }
    }

    fn update_inner(
        &self,
        repository: &RepositoryHandle,
        context: &Context,
    ) -> Result<bool, GitError> {
        match &self.reference {
            ReferenceSpec::LatestTagOfBranch(branch) => {
                let before = repository.head_id();

                repository.fetch(context)?;
                repository.checkout_branch(branch)?;
                repository.fast_forward(branch)?;

                match repository.latest_tag() {
                    Ok(tag) => {
                        debug!("Latest tag on {branch} is {tag}.");
                        repository.checkout_tag(&tag)?;
                    }
                    Err(GitError::NoTagFound(_)) => {
                        debug!("There are no tags on {branch}, nothing to check out.");
                    }
                    Err(err) => return Err(err),
                }

                let after = repository.head_id();
                if let (Some(after), true) = (after, before != after) {
                    info!("Checked out {}.", shorthash(&after));
                }
                Ok(before != after)
            }
            ReferenceSpec::Branch(branch) | ReferenceSpec::LatestCommitOfBranch(branch) => {
                repository.pull(branch, context)
            }
            ReferenceSpec::Tag(tag) => {
                debug!("Staying on fixed tag {tag}.");
                Ok(false)
            }
        }
    }
}

impl Synchronizer for GitSynchronizer {
    fn setup(&mut self, context: &Context) -> Result<(), SyncError> {
        let repository = self.setup_inner(context).map_err(SyncError::setup)?;
        self.repository = Some(repository);

        Ok(())
    }

    fn update(&mut self, context: &Context) -> Result<bool, SyncError> {
        let repository = self.repository.as_ref().ok_or(SyncError::NotSetUp)?;

        match self.update_inner(repository, context) {
            Ok(changed) => Ok(changed),
            // A missing tag only means there is nothing to check out yet.
            Err(GitError::NoTagFound(_)) => Ok(false),
            Err(err) => Err(SyncError::update(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duct::cmd;
    use rand::distributions::{Alphanumeric, DistString};
    use std::error::Error;

    fn get_random_id() -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), 16)
    }

    fn create_test_root() -> Result<PathBuf, Box<dyn Error>> {
        let root = std::env::temp_dir().join(format!("gitdeploy-{}", get_random_id()));
        fs::create_dir_all(&root)?;

        Ok(root)
    }

    fn commit(dir: &Path, file: &str) -> Result<String, Box<dyn Error>> {
        fs::write(dir.join(file), file)?;
        cmd!("git", "add", "-A").dir(dir).read()?;
        cmd!(
            "git",
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "commit",
            "-m",
            file
        )
        .dir(dir)
        .read()?;

        get_last_commit(dir)
    }

    fn get_last_commit(dir: &Path) -> Result<String, Box<dyn Error>> {
        let commit_sha = cmd!("git", "rev-parse", "HEAD").dir(dir).read()?;

        Ok(commit_sha)
    }

    fn push(dir: &Path, branch: &str) -> Result<(), Box<dyn Error>> {
        cmd!("git", "push", "origin", branch, "--tags").dir(dir).read()?;

        Ok(())
    }

    fn create_tag(dir: &Path, tag: &str, annotated: bool) -> Result<(), Box<dyn Error>> {
        if annotated {
            cmd!(
                "git",
                "-c",
                "user.name=test",
                "-c",
                "user.email=test@example.com",
                "tag",
                "-a",
                tag,
                "-m",
                tag
            )
            .dir(dir)
            .read()?;
        } else {
            cmd!("git", "tag", tag).dir(dir).read()?;
        }

        Ok(())
    }

    /// Create a bare remote and a seed repository that pushes to it, with one commit on master.
    fn create_remote(root: &Path) -> Result<(PathBuf, PathBuf), Box<dyn Error>> {
        let remote = root.join("remote");
        let seed = root.join("seed");

        fs::create_dir_all(&remote)?;
        cmd!("git", "init", "--bare").dir(&remote).read()?;
        cmd!("git", "symbolic-ref", "HEAD", "refs/heads/master")
            .dir(&remote)
            .read()?;

        fs::create_dir_all(&seed)?;
        cmd!("git", "init").dir(&seed).read()?;
        cmd!("git", "symbolic-ref", "HEAD", "refs/heads/master")
            .dir(&seed)
            .read()?;
        cmd!("git", "remote", "add", "origin", &remote)
            .dir(&seed)
            .read()?;
        commit(&seed, "1")?;
        push(&seed, "master")?;

        Ok((remote, seed))
    }

    fn create_config(remote: &Path, local: &Path, branch: &str) -> RepositoryConfig {
        RepositoryConfig {
            url: remote.to_string_lossy().to_string(),
            path: local.to_path_buf(),
            branch: branch.to_string(),
            safe_directory_config: None,
            ..RepositoryConfig::default()
        }
    }

    fn cleanup(root: &Path) -> Result<(), Box<dyn Error>> {
        fs::remove_dir_all(root)?;

        Ok(())
    }

    #[test]
    fn it_should_derive_the_path_from_the_url() {
        assert_eq!(
            Some(PathBuf::from("site")),
            RepositoryConfig::path_from_url("https://example.com/user/site.git")
        );
        assert_eq!(
            Some(PathBuf::from("site")),
            RepositoryConfig::path_from_url("https://example.com/user/site/")
        );
        assert_eq!(None, RepositoryConfig::path_from_url("https://example.com"));
        assert_eq!(None, RepositoryConfig::path_from_url("not a url"));

        let config = RepositoryConfig::new("https://example.com/user/site.git", None);
        assert_eq!(PathBuf::from("site"), config.path);
        assert_eq!("origin", config.remote);
    }

    #[test]
    fn it_should_validate_the_url_scheme() {
        let config = RepositoryConfig::new("https://example.com/user/site.git", None);
        assert!(config.validate().is_ok());

        let config = RepositoryConfig::new("http://example.com/user/site.git", None);
        assert!(config.validate().is_ok());

        for url in ["", "git@github.com:user/site.git", "ssh://example.com/site.git"] {
            let config = RepositoryConfig::new(url, Some(PathBuf::from("site")));
            let result = config.validate();
            assert!(
                matches!(result, Err(SyncError::Misconfigured(_))),
                "{url:?} should be Misconfigured, got {result:?}"
            );
        }
    }

    #[test]
    fn it_should_fail_on_invalid_references() {
        let config = RepositoryConfig {
            branch: String::from("tag|"),
            ..RepositoryConfig::new("https://example.com/site.git", None)
        };

        let result = GitSynchronizer::new(config);
        assert!(
            matches!(result, Err(SyncError::InvalidReference(_))),
            "should be InvalidReference"
        );
    }

    #[test]
    fn it_should_fail_to_update_before_setup() {
        let config = RepositoryConfig::new("https://example.com/site.git", None);
        let mut synchronizer = GitSynchronizer::new(config).unwrap();

        let result = synchronizer.update(&Context::new());
        assert!(
            matches!(result, Err(SyncError::NotSetUp)),
            "{result:?} should be NotSetUp"
        );
    }

    #[test]
    fn it_should_clone_into_a_missing_directory() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, seed) = create_remote(&root)?;
        let local = root.join("local");

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, ""))?;
        synchronizer.setup(&Context::new())?;

        assert!(local.join("1").exists());
        assert_eq!(get_last_commit(&seed)?, get_last_commit(&local)?);
        let repository = synchronizer.repository.as_ref().unwrap();
        assert_eq!(
            Some(String::from("refs/heads/master")),
            repository.head_refname()
        );

        cleanup(&root)
    }

    #[test]
    fn it_should_clone_into_an_empty_directory() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");
        fs::create_dir_all(&local)?;

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, "master"))?;
        synchronizer.setup(&Context::new())?;

        assert!(local.join("1").exists());

        cleanup(&root)
    }

    #[test]
    fn it_should_add_the_checkout_to_the_configured_gitconfig() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");
        let gitconfig = root.join("gitconfig");

        let config = RepositoryConfig {
            safe_directory_config: Some(gitconfig.clone()),
            ..create_config(&remote, &local, "master")
        };
        let mut synchronizer = GitSynchronizer::new(config)?;
        synchronizer.setup(&Context::new())?;

        let content = fs::read_to_string(&gitconfig)?;
        assert!(content.starts_with("[safe]"));
        assert!(content.contains(&local.to_string_lossy().to_string()));

        cleanup(&root)
    }

    #[test]
    fn it_should_clone_with_a_custom_remote_name() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");

        let config = RepositoryConfig {
            remote: String::from("upstream"),
            single_branch: true,
            ..create_config(&remote, &local, "master")
        };
        let mut synchronizer = GitSynchronizer::new(config)?;
        synchronizer.setup(&Context::new())?;

        let remotes = cmd!("git", "remote").dir(&local).read()?;
        assert_eq!("upstream", remotes);

        cleanup(&root)
    }

    #[test]
    fn it_should_refuse_a_non_empty_directory() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");
        fs::create_dir_all(&local)?;
        fs::write(local.join("important"), "do not delete")?;

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, ""))?;
        let result = synchronizer.setup(&Context::new());

        assert!(
            matches!(result, Err(SyncError::NotAGitDirectory(_))),
            "{result:?} should be NotAGitDirectory"
        );
        assert_eq!("do not delete", fs::read_to_string(local.join("important"))?);

        cleanup(&root)
    }

    #[test]
    fn it_should_repoint_the_remote_of_an_existing_repository() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");

        // Clone and point the remote somewhere else, with an extra local commit
        cmd!("git", "clone", &remote, &local).read()?;
        cmd!("git", "remote", "set-url", "origin", "/path/to/nowhere")
            .dir(&local)
            .read()?;
        let local_commit = commit(&local, "local")?;

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, "master"))?;
        synchronizer.setup(&Context::new())?;

        let repository = synchronizer.repository.as_ref().unwrap();
        assert_eq!(
            Some(remote.to_string_lossy().to_string()),
            repository.remote_url()
        );

        // The history should be kept
        cmd!("git", "cat-file", "-e", &local_commit)
            .dir(&local)
            .read()?;
        assert!(local.join("local").exists());

        cleanup(&root)
    }

    #[test]
    fn it_should_pull_new_commits_on_a_branch() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, seed) = create_remote(&root)?;
        let local = root.join("local");

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, "master"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        let new_commit = commit(&seed, "2")?;
        push(&seed, "master")?;

        let changed = synchronizer.update(&context)?;
        assert!(changed);
        assert!(local.join("2").exists());
        assert_eq!(new_commit, get_last_commit(&local)?);

        cleanup(&root)
    }

    #[test]
    fn it_should_treat_up_to_date_as_success() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");

        let mut synchronizer =
            GitSynchronizer::new(create_config(&remote, &local, "latest_commit|master"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        let changed = synchronizer.update(&context)?;
        assert!(!changed);

        cleanup(&root)
    }

    #[test]
    fn it_should_fail_to_update_a_diverged_branch() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, seed) = create_remote(&root)?;
        let local = root.join("local");

        let mut synchronizer = GitSynchronizer::new(create_config(&remote, &local, "master"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        commit(&local, "local")?;
        commit(&seed, "remote")?;
        push(&seed, "master")?;

        let result = synchronizer.update(&context);
        assert!(
            matches!(result, Err(SyncError::UpdateFailed(_))),
            "{result:?} should be UpdateFailed"
        );

        cleanup(&root)
    }

    #[test]
    fn it_should_stay_on_a_fixed_tag() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, seed) = create_remote(&root)?;
        let local = root.join("local");

        let tagged_commit = get_last_commit(&seed)?;
        create_tag(&seed, "v1.0.0", false)?;
        commit(&seed, "2")?;
        push(&seed, "master")?;

        let mut synchronizer =
            GitSynchronizer::new(create_config(&remote, &local, "tag|v1.0.0"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        assert_eq!(tagged_commit, get_last_commit(&local)?);
        assert!(!local.join("2").exists());

        let changed = synchronizer.update(&context)?;
        assert!(!changed);
        assert_eq!(tagged_commit, get_last_commit(&local)?);

        cleanup(&root)
    }

    #[test]
    fn it_should_check_out_the_latest_tag_of_the_branch() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, seed) = create_remote(&root)?;
        let local = root.join("local");

        // A (v1.0.0) <- B (v1.1.0) <- C on master
        let commit_a = get_last_commit(&seed)?;
        create_tag(&seed, "v1.0.0", false)?;
        let commit_b = commit(&seed, "2")?;
        create_tag(&seed, "v1.1.0", true)?;
        commit(&seed, "3")?;
        push(&seed, "master")?;

        // A newer tag on an unrelated branch
        cmd!("git", "checkout", "-b", "other", &commit_a)
            .dir(&seed)
            .read()?;
        commit(&seed, "other")?;
        create_tag(&seed, "v9.9.9", false)?;
        push(&seed, "other")?;

        let mut synchronizer =
            GitSynchronizer::new(create_config(&remote, &local, "latest_tag|master"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        let changed = synchronizer.update(&context)?;
        assert!(changed);
        assert_eq!(commit_b, get_last_commit(&local)?);
        assert!(!local.join("3").exists());

        // Nothing changes on the second update
        let changed = synchronizer.update(&context)?;
        assert!(!changed);

        // Resetting the branch to A should find the older tag
        cmd!("git", "checkout", "-f", "master").dir(&local).read()?;
        cmd!("git", "reset", "--hard", &commit_a)
            .dir(&local)
            .read()?;
        let repository = synchronizer.repository.as_ref().unwrap();
        assert_eq!("v1.0.0", repository.latest_tag()?);

        cleanup(&root)
    }

    #[test]
    fn it_should_not_fail_if_there_are_no_tags() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let (remote, _) = create_remote(&root)?;
        let local = root.join("local");

        let mut synchronizer =
            GitSynchronizer::new(create_config(&remote, &local, "latest_tag|"))?;
        let context = Context::new();
        synchronizer.setup(&context)?;

        let result = synchronizer.update(&context);
        assert!(matches!(result, Ok(false)), "{result:?} should be Ok(false)");

        let repository = synchronizer.repository.as_ref().unwrap();
        let error = repository.latest_tag().unwrap_err();
        assert!(
            matches!(error, GitError::NoTagFound(_)),
            "{error:?} should be NoTagFound"
        );

        cleanup(&root)
    }

    #[test]
    fn it_should_fail_setup_if_the_remote_is_unreachable() -> Result<(), Box<dyn Error>> {
        let root = create_test_root()?;
        let local = root.join("local");

        let mut synchronizer = GitSynchronizer::new(create_config(
            &root.join("missing-remote"),
            &local,
            "",
        ))?;
        let result = synchronizer.setup(&Context::new());

        assert!(
            matches!(result, Err(SyncError::SetupFailed(_))),
            "{result:?} should be SetupFailed"
        );

        cleanup(&root)
    }
}

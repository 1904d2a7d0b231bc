use super::{
    credentials::{CredentialHandler, Credentials},
    RepositoryConfig,
};
use crate::{context::Context, reference::ReferenceSpec};
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    AutotagOption, ErrorCode, FetchOptions, Oid, RemoteCallbacks, Repository, Sort,
};
use log::{debug, trace};
use std::collections::HashMap;
use thiserror::Error;

/// A custom error describing the failures of the git operations.
#[derive(Debug, Error)]
pub enum GitError {
    /// The path exists and cannot be opened as a repository.
    #[error("{0} is not a git repository")]
    NotARepository(String),
    /// The path is neither empty nor a repository, we refuse to clone over it.
    #[error("{0} is neither empty nor a git repository")]
    NotAGitDirectory(String),
    /// The repository exists but cannot be opened.
    #[error("cannot open {0} ({1})")]
    OpenFailed(String, String),
    /// Cloning failed. This can be a network failure, authentication error or many other things.
    #[error("cannot clone {0} ({1})")]
    CloneFailed(String, String),
    /// Cannot recreate the remote with the configured URL.
    #[error("cannot configure remote {0} ({1})")]
    RemoteFailed(String, String),
    /// Cannot fetch the remote. This can be a network failure, authentication error or many other things.
    #[error("cannot fetch ({0})")]
    FetchFailed(String),
    /// The branch or tag is not found locally or on the remote.
    #[error("cannot find reference {0}")]
    ReferenceNotFound(String),
    /// Cannot check out the reference into the working tree.
    #[error("cannot check out {0} ({1})")]
    CheckoutFailed(String, String),
    /// The local branch diverged from the remote, so it cannot be fast-forwarded.
    #[error("cannot update branch {0}, it cannot be fast-forwarded")]
    NotFastForward(String),
    /// Cannot set the branch to the fetched commit.
    #[error("could not set HEAD to fetch commit {0}")]
    FailedSettingHead(String),
    /// There are no tags reachable from the branch.
    #[error("no tag found on branch {0}")]
    NoTagFound(String),
    /// Cannot walk the commit history or read the tags.
    #[error("cannot read history ({0})")]
    HistoryFailed(String),
    /// Cannot create the git config. The parameters are the path and the reason.
    #[error("cannot write git config {0} ({1})")]
    ConfigWriteFailed(String, String),
    /// The transfer was interrupted, because the context was cancelled.
    #[error("cancelled")]
    Cancelled,
}

/// Build the fetch options shared by clone and fetch: authentication, all tags,
/// shallow depth and interrupting the transfer on cancellation.
fn fetch_options(
    context: &Context,
    credentials: Option<Credentials>,
    depth: u32,
) -> FetchOptions<'static> {
    let mut callbacks = RemoteCallbacks::new();
    let mut handler = CredentialHandler::new(credentials);
    callbacks.credentials(move |url, username, allowed| {
        handler.try_next_credential(url, username, allowed)
    });
    let context = context.clone();
    callbacks.transfer_progress(move |_| !context.is_cancelled());

    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options.download_tags(AutotagOption::All);
    if depth > 0 {
        options.depth(i32::try_from(depth).unwrap_or(i32::MAX));
    }

    options
}

/// The fetch refspec used for single-branch checkouts.
fn single_branch_refspec(remote: &str, reference: &ReferenceSpec) -> Option<String> {
    reference
        .branch()
        .map(|branch| format!("+refs/heads/{branch}:refs/remotes/{remote}/{branch}"))
}

/// A git repository checked out on disk.
///
/// This is the only object that writes the working tree, so every session must
/// own its own handle.
pub struct RepositoryHandle {
    repo: Repository,
    remote_name: String,
    credentials: Option<Credentials>,
    single_branch: bool,
    depth: u32,
}

impl RepositoryHandle {
    fn from_repository(repo: Repository, config: &RepositoryConfig) -> Self {
        RepositoryHandle {
            repo,
            remote_name: config.remote.clone(),
            credentials: config.credentials(),
            single_branch: config.single_branch,
            depth: config.depth,
        }
    }

    /// Open an existing repository at the configured path.
    pub fn open(config: &RepositoryConfig) -> Result<Self, GitError> {
        let path = config.path.to_string_lossy().to_string();
        let repo = Repository::open(&config.path).map_err(|err| match err.code() {
            ErrorCode::NotFound => GitError::NotARepository(path.clone()),
            _ => GitError::OpenFailed(path.clone(), err.message().to_string()),
        })?;

        Ok(Self::from_repository(repo, config))
    }

    /// Clone the configured URL into the configured path, checking out the reference.
    pub fn clone_remote(
        config: &RepositoryConfig,
        reference: &ReferenceSpec,
        context: &Context,
    ) -> Result<Self, GitError> {
        let mut builder = RepoBuilder::new();
        builder.fetch_options(fetch_options(context, config.credentials(), config.depth));

        let remote_name = config.remote.clone();
        let refspec = if config.single_branch {
            single_branch_refspec(&config.remote, reference)
        } else {
            None
        };
        builder.remote_create(move |repo, _name, url| match &refspec {
            Some(refspec) => repo.remote_with_fetch(&remote_name, url, refspec),
            None => repo.remote(&remote_name, url),
        });

        if let Some(branch) = reference.branch() {
            builder.branch(branch);
        }

        let repo = builder.clone(&config.url, &config.path).map_err(|err| {
            if context.is_cancelled() {
                GitError::Cancelled
            } else {
                GitError::CloneFailed(config.url.clone(), err.message().to_string())
            }
        })?;

        let handle = Self::from_repository(repo, config);
        if let ReferenceSpec::Tag(tag) = reference {
            handle.checkout_tag(tag)?;
        }

        Ok(handle)
    }

    /// Delete the remote (if it exists) and add it again with the given URL.
    pub fn set_remote(&self, url: &str, reference: &ReferenceSpec) -> Result<(), GitError> {
        let Self {
            repo, remote_name, ..
        } = self;
        let remote_failed =
            |err: git2::Error| GitError::RemoteFailed(remote_name.clone(), err.message().into());

        match repo.remote_delete(remote_name) {
            Ok(()) => {}
            Err(err) if err.code() == ErrorCode::NotFound => {
                trace!("Remote {remote_name} not found, nothing to delete.");
            }
            Err(err) => return Err(remote_failed(err)),
        }

        let refspec = if self.single_branch {
            single_branch_refspec(remote_name, reference)
        } else {
            None
        };
        let created = match refspec {
            Some(refspec) => repo.remote_with_fetch(remote_name, url, &refspec),
            None => repo.remote(remote_name, url),
        };
        created.map_err(remote_failed)?;

        Ok(())
    }

    /// Fetch every configured refspec and all tags from the remote.
    pub fn fetch(&self, context: &Context) -> Result<(), GitError> {
        let Self {
            repo, remote_name, ..
        } = self;
        let mut remote = repo
            .find_remote(remote_name)
            .map_err(|err| GitError::RemoteFailed(remote_name.clone(), err.message().into()))?;

        let mut options = fetch_options(context, self.credentials.clone(), self.depth);
        remote
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(|err| {
                if context.is_cancelled() {
                    GitError::Cancelled
                } else {
                    GitError::FetchFailed(err.message().to_string())
                }
            })?;

        debug!("Fetched {remote_name}.");
        Ok(())
    }

    /// Check out the reference: a branch is checked out attached, a tag detached.
    pub fn checkout(&self, reference: &ReferenceSpec) -> Result<(), GitError> {
        match reference {
            ReferenceSpec::Tag(tag) => self.checkout_tag(tag),
            ReferenceSpec::Branch(branch)
            | ReferenceSpec::LatestTagOfBranch(branch)
            | ReferenceSpec::LatestCommitOfBranch(branch) => self.checkout_branch(branch),
        }
    }

    /// Check out the local branch, creating it from the remote-tracking branch if needed.
    pub fn checkout_branch(&self, branch: &str) -> Result<(), GitError> {
        let Self {
            repo, remote_name, ..
        } = self;
        let local_refname = format!("refs/heads/{branch}");
        let checkout_failed =
            |err: git2::Error| GitError::CheckoutFailed(branch.to_string(), err.message().into());

        if repo.find_reference(&local_refname).is_err() {
            let remote_refname = format!("refs/remotes/{remote_name}/{branch}");
            let target = repo
                .find_reference(&remote_refname)
                .and_then(|reference| reference.peel_to_commit())
                .map_err(|_| GitError::ReferenceNotFound(remote_refname.clone()))?;

            let mut created = repo.branch(branch, &target, false).map_err(checkout_failed)?;
            created
                .set_upstream(Some(format!("{remote_name}/{branch}").as_str()))
                .map_err(checkout_failed)?;
            trace!("Created branch {branch} from {remote_refname}.");
        }

        repo.set_head(&local_refname).map_err(checkout_failed)?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))
            .map_err(checkout_failed)?;

        Ok(())
    }

    /// Check out the commit of the tag, detaching HEAD.
    pub fn checkout_tag(&self, tag: &str) -> Result<(), GitError> {
        let Self { repo, .. } = self;
        let refname = format!("refs/tags/{tag}");
        let commit = repo
            .find_reference(&refname)
            .and_then(|reference| reference.peel_to_commit())
            .map_err(|_| GitError::ReferenceNotFound(refname.clone()))?;
        let checkout_failed =
            |err: git2::Error| GitError::CheckoutFailed(refname.clone(), err.message().into());

        repo.checkout_tree(
            commit.as_object(),
            Some(CheckoutBuilder::default().force()),
        )
        .map_err(checkout_failed)?;
        repo.set_head_detached(commit.id())
            .map_err(checkout_failed)?;

        Ok(())
    }

    // Inspired from: https://github.com/rust-lang/git2-rs/blob/master/examples/pull.rs
    /// Fast-forward the checked out branch to its remote-tracking branch.
    /// Returns false if it was already up to date.
    pub fn fast_forward(&self, branch: &str) -> Result<bool, GitError> {
        let Self {
            repo, remote_name, ..
        } = self;
        let remote_refname = format!("refs/remotes/{remote_name}/{branch}");
        let fetch_ref = repo
            .find_reference(&remote_refname)
            .map_err(|_| GitError::ReferenceNotFound(remote_refname.clone()))?;
        let fetch_commit = repo
            .reference_to_annotated_commit(&fetch_ref)
            .map_err(|err| GitError::FetchFailed(err.message().to_string()))?;

        let (analysis, _) = repo
            .merge_analysis(&[&fetch_commit])
            .map_err(|_| GitError::NotFastForward(branch.to_string()))?;

        if analysis.is_up_to_date() {
            return Ok(false);
        } else if !analysis.is_fast_forward() {
            return Err(GitError::NotFastForward(branch.to_string()));
        }

        let fetch_id = fetch_commit.id();
        let branch_refname = format!("refs/heads/{branch}");
        let msg = format!("Fast-Forward: Setting {branch_refname} to id: {fetch_id}");
        let mut branch_ref = repo
            .find_reference(&branch_refname)
            .map_err(|_| GitError::ReferenceNotFound(branch_refname.clone()))?;
        branch_ref
            .set_target(fetch_id, &msg)
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;
        repo.set_head(&branch_refname)
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;
        repo.checkout_head(Some(CheckoutBuilder::default().force()))
            .map_err(|_| GitError::FailedSettingHead(fetch_id.to_string()))?;

        debug!("Fast-forwarded {branch} to {}.", shorthash(&fetch_id));
        Ok(true)
    }

    /// Fetch, make sure the branch is checked out and fast-forward it.
    pub fn pull(&self, branch: &str, context: &Context) -> Result<bool, GitError> {
        self.fetch(context)?;
        let branch_refname = format!("refs/heads/{branch}");
        if self.head_refname().as_deref() != Some(branch_refname.as_str()) {
            self.checkout_branch(branch)?;
        }
        self.fast_forward(branch)
    }

    /// Find the newest tag reachable from HEAD.
    ///
    /// Tag names are not ordered chronologically and tags can point to other branches,
    /// so the history is walked from HEAD in committer time order and the first
    /// commit that has a tag wins.
    pub fn latest_tag(&self) -> Result<String, GitError> {
        let Self { repo, .. } = self;
        let history_failed = |err: git2::Error| GitError::HistoryFailed(err.message().into());

        let mut tags: HashMap<Oid, String> = HashMap::new();
        let tag_names = repo.tag_names(None).map_err(history_failed)?;
        for name in tag_names.iter().flatten() {
            let refname = format!("refs/tags/{name}");
            if let Ok(commit) = repo
                .find_reference(&refname)
                .and_then(|reference| reference.peel_to_commit())
            {
                tags.insert(commit.id(), name.to_string());
            }
        }

        let head = self.head_id().ok_or_else(|| {
            GitError::HistoryFailed(String::from("HEAD does not point to a commit"))
        })?;
        let mut revwalk = repo.revwalk().map_err(history_failed)?;
        revwalk.push(head).map_err(history_failed)?;
        revwalk
            .set_sorting(Sort::TOPOLOGICAL | Sort::TIME)
            .map_err(history_failed)?;

        for oid in revwalk {
            let oid = oid.map_err(history_failed)?;
            if let Some(tag) = tags.get(&oid) {
                return Ok(tag.clone());
            }
        }

        let branch = repo
            .head()
            .ok()
            .and_then(|head| head.shorthand().map(String::from))
            .unwrap_or_else(|| String::from("HEAD"));
        Err(GitError::NoTagFound(branch))
    }

    /// The commit HEAD points to, if any.
    pub fn head_id(&self) -> Option<Oid> {
        self.repo.head().ok().and_then(|head| head.target())
    }

    /// The full reference name HEAD points to (e.g. `refs/heads/main`), None if detached.
    pub fn head_refname(&self) -> Option<String> {
        let head = self.repo.head().ok()?;
        if head.is_branch() {
            head.name().map(String::from)
        } else {
            None
        }
    }

    /// The URL of the remote.
    pub fn remote_url(&self) -> Option<String> {
        self.repo
            .find_remote(&self.remote_name)
            .ok()
            .and_then(|remote| remote.url().map(String::from))
    }
}

/// The first seven characters of a commit id, like `git log --oneline`.
pub fn shorthash(oid: &Oid) -> String {
    oid.to_string().chars().take(7).collect()
}

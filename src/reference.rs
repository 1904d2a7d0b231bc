use std::{fmt, str::FromStr};
use thiserror::Error;

/// The branch used when nothing else is configured.
pub const DEFAULT_BRANCH: &str = "master";

const SEPARATOR: char = '|';
const PLACEHOLDER_PREFIX: &str = "git.ref.";

/// The reference a repository is kept in sync with.
///
/// It is resolved from the configured branch-or-tag string, which can be:
///   - empty, meaning the `master` branch,
///   - a plain branch name (e.g. `main`),
///   - a marker in the form `<kind>|<name>` where kind is `tag`, `latest_tag` or `latest_commit`
///     (e.g. `tag|v1.0.0`, `latest_tag|main`, `latest_tag|`),
///   - a placeholder like `{git.ref.tag.v1.0.0}`, `{git.ref.branch.main.latest_tag}`
///     or `{git.ref.latest_tag}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceSpec {
    /// Follow the tip of a branch.
    Branch(String),
    /// Stay on a fixed tag.
    Tag(String),
    /// Follow the newest tag reachable from the branch.
    LatestTagOfBranch(String),
    /// Follow the tip of a branch, same as [ReferenceSpec::Branch].
    LatestCommitOfBranch(String),
}

/// A custom error describing the error cases for the reference resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    /// The reference has a marker, but it cannot be parsed.
    #[error("invalid reference {0:?}: {1}")]
    InvalidReference(String, String),
}

fn invalid(reference: &str, reason: &str) -> ReferenceError {
    ReferenceError::InvalidReference(reference.to_string(), reason.to_string())
}

fn branch_or_default(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_BRANCH.to_string()
    } else {
        name.to_string()
    }
}

fn non_empty(reference: &str, name: &str, what: &str) -> Result<String, ReferenceError> {
    if name.is_empty() {
        Err(invalid(reference, &format!("{what} name is empty")))
    } else {
        Ok(name.to_string())
    }
}

impl ReferenceSpec {
    /// Resolve the configured branch-or-tag string.
    pub fn resolve(reference: &str) -> Result<Self, ReferenceError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Ok(ReferenceSpec::Branch(DEFAULT_BRANCH.to_string()));
        }

        if let Some(key) = reference
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            return Self::resolve_placeholder(reference, key);
        }

        if let Some((kind, name)) = reference.split_once(SEPARATOR) {
            return Self::resolve_marker(reference, kind, name);
        }

        Ok(ReferenceSpec::Branch(reference.to_string()))
    }

    fn resolve_marker(reference: &str, kind: &str, name: &str) -> Result<Self, ReferenceError> {
        if name.contains(SEPARATOR) {
            return Err(invalid(reference, "too many separators"));
        }

        match kind {
            "tag" => Ok(ReferenceSpec::Tag(non_empty(reference, name, "tag")?)),
            "latest_tag" => Ok(ReferenceSpec::LatestTagOfBranch(branch_or_default(name))),
            "latest_commit" => Ok(ReferenceSpec::LatestCommitOfBranch(branch_or_default(name))),
            kind => Err(invalid(
                reference,
                &format!("unknown kind {kind:?}, valid kinds: tag, latest_tag, latest_commit"),
            )),
        }
    }

    fn resolve_placeholder(reference: &str, key: &str) -> Result<Self, ReferenceError> {
        let rest = key
            .strip_prefix(PLACEHOLDER_PREFIX)
            .ok_or_else(|| invalid(reference, "unknown placeholder"))?;

        match rest {
            "latest_tag" => return Ok(ReferenceSpec::LatestTagOfBranch(DEFAULT_BRANCH.into())),
            "latest_commit" => {
                return Ok(ReferenceSpec::LatestCommitOfBranch(DEFAULT_BRANCH.into()))
            }
            _ => {}
        }

        if let Some(tag) = rest.strip_prefix("tag.") {
            return Ok(ReferenceSpec::Tag(non_empty(reference, tag, "tag")?));
        }

        if let Some(branch) = rest.strip_prefix("branch.") {
            if let Some(branch) = branch.strip_suffix(".latest_tag") {
                let branch = non_empty(reference, branch, "branch")?;
                return Ok(ReferenceSpec::LatestTagOfBranch(branch));
            }
            if let Some(branch) = branch.strip_suffix(".latest_commit") {
                let branch = non_empty(reference, branch, "branch")?;
                return Ok(ReferenceSpec::LatestCommitOfBranch(branch));
            }
            return Ok(ReferenceSpec::Branch(non_empty(reference, branch, "branch")?));
        }

        Err(invalid(reference, "unknown placeholder"))
    }

    /// The branch to fetch and check out, or None for a fixed tag.
    pub fn branch(&self) -> Option<&str> {
        match self {
            ReferenceSpec::Branch(name)
            | ReferenceSpec::LatestTagOfBranch(name)
            | ReferenceSpec::LatestCommitOfBranch(name) => Some(name),
            ReferenceSpec::Tag(_) => None,
        }
    }

    /// Whether every update should search for the newest tag.
    pub fn tracks_latest_tag(&self) -> bool {
        matches!(self, ReferenceSpec::LatestTagOfBranch(_))
    }

    /// The full git reference name (e.g. `refs/heads/main` or `refs/tags/v1.0.0`).
    pub fn reference_name(&self) -> String {
        match self {
            ReferenceSpec::Tag(name) => format!("refs/tags/{name}"),
            ReferenceSpec::Branch(name)
            | ReferenceSpec::LatestTagOfBranch(name)
            | ReferenceSpec::LatestCommitOfBranch(name) => format!("refs/heads/{name}"),
        }
    }
}

impl FromStr for ReferenceSpec {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReferenceSpec::resolve(s)
    }
}

impl fmt::Display for ReferenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceSpec::Branch(name) => write!(f, "{name}"),
            ReferenceSpec::Tag(name) => write!(f, "tag{SEPARATOR}{name}"),
            ReferenceSpec::LatestTagOfBranch(name) => write!(f, "latest_tag{SEPARATOR}{name}"),
            ReferenceSpec::LatestCommitOfBranch(name) => {
                write!(f, "latest_commit{SEPARATOR}{name}")
            }
        }
    }
}

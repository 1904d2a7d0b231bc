use super::git::GitError;
use dirs::home_dir;
use log::debug;
use std::{
    fs::OpenOptions,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

/// The global gitconfig of the current user, if there is a home directory.
pub fn global_gitconfig() -> Option<PathBuf> {
    home_dir().map(|home| home.join(".gitconfig"))
}

/// Register the checkout as a safe directory in a new gitconfig file.
///
/// libgit2 refuses to open a repository owned by a different user than ours, which
/// is common in containers with mounted volumes. An existing gitconfig is never
/// touched, it is only created when missing (usually in containers).
/// Returns whether the file was written.
pub fn add_safe_directory(gitconfig: &Path, directory: &Path) -> Result<bool, GitError> {
    let write_failed = |err: std::io::Error| {
        GitError::ConfigWriteFailed(gitconfig.to_string_lossy().to_string(), err.to_string())
    };

    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(gitconfig)
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => return Err(write_failed(err)),
    };

    debug!(
        "There was no {}, adding {} as safe directory.",
        gitconfig.to_string_lossy(),
        directory.to_string_lossy()
    );
    writeln!(file, "[safe]\n  directory = {}", directory.to_string_lossy()).map_err(write_failed)?;

    Ok(true)
}

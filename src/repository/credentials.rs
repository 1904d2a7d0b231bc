// Credential handling based on https://github.com/davidB/git2_credentials,
// reduced to what HTTP(S) remotes need.

use std::fmt;

/// The username used when only a password (e.g. an access token) is configured.
pub const DEFAULT_USERNAME: &str = "gitdeploy";

/// Basic authentication for HTTP(S) remotes.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Build the credentials from the optional username and password.
    ///
    /// Returns None if neither is set. If only the password is set, it is treated
    /// as an access token with the [DEFAULT_USERNAME].
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        let username = username.filter(|u| !u.is_empty());
        let password = password.filter(|p| !p.is_empty());
        if username.is_none() && password.is_none() {
            return None;
        }

        Some(Credentials {
            username: username.unwrap_or(DEFAULT_USERNAME).to_string(),
            password: password.unwrap_or_default().to_string(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

pub struct CredentialHandler {
    credentials: Option<Credentials>,
    credentials_attempted: bool,
    cred_helper_bad: Option<bool>,
    cfg: Option<git2::Config>,
}

impl CredentialHandler {
    pub fn new(credentials: Option<Credentials>) -> Self {
        CredentialHandler {
            credentials,
            credentials_attempted: false,
            cred_helper_bad: None,
            cfg: git2::Config::open_default().ok(),
        }
    }

    /// Return the next credential to try for an HTTP(S) remote.
    ///
    /// The configured username and password are tried first, then the git
    /// credential helper (`credential.helper`), and finally the default credential.
    /// libgit2 keeps asking until we return an error, so every method is only
    /// attempted once.
    pub fn try_next_credential(
        &mut self,
        url: &str,
        username: Option<&str>,
        allowed: git2::CredentialType,
    ) -> Result<git2::Cred, git2::Error> {
        if allowed.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
            if let (Some(credentials), false) = (&self.credentials, self.credentials_attempted) {
                self.credentials_attempted = true;
                return git2::Cred::userpass_plaintext(
                    &credentials.username,
                    &credentials.password,
                );
            }

            if let (Some(cfg), None) = (&self.cfg, self.cred_helper_bad) {
                let r = git2::Cred::credential_helper(cfg, url, username);
                self.cred_helper_bad = Some(r.is_err());
                return r;
            }
        }

        if allowed.contains(git2::CredentialType::DEFAULT) {
            return git2::Cred::default();
        }

        Err(git2::Error::from_str("no valid authentication available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_should_not_create_credentials_without_parts() {
        assert_eq!(None, Credentials::from_parts(None, None));
        assert_eq!(None, Credentials::from_parts(Some(""), Some("")));
    }

    #[test]
    fn it_should_default_the_username_for_tokens() {
        let credentials = Credentials::from_parts(None, Some("token")).unwrap();
        assert_eq!(DEFAULT_USERNAME, credentials.username);
        assert_eq!("token", credentials.password);
    }

    #[test]
    fn it_should_keep_the_given_username() {
        let credentials = Credentials::from_parts(Some("user"), Some("pass")).unwrap();
        assert_eq!("user", credentials.username);
        assert_eq!("pass", credentials.password);
    }

    #[test]
    fn it_should_hide_the_password_when_printed() {
        let credentials = Credentials::from_parts(Some("user"), Some("secret")).unwrap();
        let printed = format!("{credentials:?}");
        assert!(printed.contains("user"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn it_should_try_the_configured_credentials_only_once() {
        let credentials = Credentials::from_parts(Some("user"), Some("pass"));
        let mut handler = CredentialHandler::new(credentials);
        handler.cfg = None;

        let first = handler.try_next_credential(
            "https://example.com/repo.git",
            None,
            git2::CredentialType::USER_PASS_PLAINTEXT,
        );
        assert!(first.is_ok());

        let second = handler.try_next_credential(
            "https://example.com/repo.git",
            None,
            git2::CredentialType::USER_PASS_PLAINTEXT,
        );
        assert!(second.is_err());
    }
}

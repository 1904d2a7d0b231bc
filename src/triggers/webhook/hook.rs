use super::WebhookRequest;
use crate::reference::ReferenceSpec;
use hmac::{Hmac, Mac};
use log::trace;
use mockall::automock;
use serde::Deserialize;
use sha1::Sha1;
use sha2::Sha256;

/// The header of the `sha256=<hex>` body signature.
pub const SIGNATURE_256_HEADER: &str = "X-Hub-Signature-256";
/// The header of the older `sha1=<hex>` body signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// What a hook needs to know about the repository to decide on an event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepositoryInfo {
    /// The full reference name followed (e.g. `refs/heads/main`).
    pub reference_name: String,
    /// Every new tag on the branch is interesting.
    pub latest_tag: bool,
}

impl From<&ReferenceSpec> for RepositoryInfo {
    fn from(reference: &ReferenceSpec) -> Self {
        RepositoryInfo {
            reference_name: reference.reference_name(),
            latest_tag: reference.tracks_latest_tag(),
        }
    }
}

/// The configuration passed to the hooks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HookConfig {
    /// Shared secret to verify the sender, if the hook supports it.
    pub secret: Option<String>,
    pub repository: RepositoryInfo,
}

/// A refused webhook request, the status is relayed to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookRejection {
    pub status: u16,
    pub reason: String,
}

impl HookRejection {
    pub fn bad_request(reason: &str) -> Self {
        HookRejection {
            status: 400,
            reason: reason.to_string(),
        }
    }

    pub fn unauthorized(reason: &str) -> Self {
        HookRejection {
            status: 401,
            reason: reason.to_string(),
        }
    }
}

enum Algorithm {
    Sha1,
    Sha256,
}

fn read_signature(request: &WebhookRequest) -> Option<(Algorithm, &str)> {
    if let Some(value) = request.header(SIGNATURE_256_HEADER) {
        return Some((Algorithm::Sha256, value));
    }
    request
        .header(SIGNATURE_HEADER)
        .map(|value| (Algorithm::Sha1, value))
}

fn verify_mac<M: Mac>(mut mac: M, body: &[u8], signature: &[u8]) -> bool {
    mac.update(body);
    mac.verify_slice(signature).is_ok()
}

/// Verify the HMAC signature of the body with the shared secret.
///
/// Without a secret only unsigned requests pass, since a signature cannot be
/// checked. With a secret every request must carry a valid signature.
pub fn verify_signature(request: &WebhookRequest, secret: Option<&str>) -> Result<(), HookRejection> {
    let secret = secret.filter(|secret| !secret.is_empty());
    let (secret, (algorithm, value)) = match (secret, read_signature(request)) {
        (None, None) => return Ok(()),
        (None, Some(_)) => return Err(HookRejection::bad_request("empty webhook secret")),
        (Some(_), None) => return Err(HookRejection::unauthorized("missing signature")),
        (Some(secret), Some(signature)) => (secret, signature),
    };

    let prefix = match algorithm {
        Algorithm::Sha1 => "sha1=",
        Algorithm::Sha256 => "sha256=",
    };
    let signature = value
        .strip_prefix(prefix)
        .and_then(|digest| hex::decode(digest).ok())
        .ok_or_else(|| HookRejection::unauthorized("invalid signature"))?;

    let key = secret.as_bytes();
    let valid = match algorithm {
        Algorithm::Sha1 => Hmac::<Sha1>::new_from_slice(key)
            .map(|mac| verify_mac(mac, &request.body, &signature)),
        Algorithm::Sha256 => Hmac::<Sha256>::new_from_slice(key)
            .map(|mac| verify_mac(mac, &request.body, &signature)),
    }
    .unwrap_or(false);

    if valid {
        trace!("Webhook signature verified.");
        Ok(())
    } else {
        Err(HookRejection::unauthorized("invalid signature"))
    }
}

/// A hook interprets the requests of one git hosting provider.
///
/// It decides whether the request is an event that should update the
/// repository. Rejections carry the status code returned to the caller.
#[automock]
pub trait HookInterpreter: Send + Sync {
    fn interpret(&self, request: &WebhookRequest, config: &HookConfig) -> Result<(), HookRejection>;
}

#[derive(Deserialize)]
struct GenericPayload {
    #[serde(rename = "ref")]
    reference: String,
}

/// A hook independent of the hosting provider.
///
/// It expects a JSON body with the pushed reference, like `{"ref": "refs/heads/main"}`.
/// Pushes to the followed branch are accepted. Tags are accepted if the latest
/// tag is followed or if it is the followed tag. If a secret is configured, the
/// body must be signed with it (see [verify_signature]).
#[derive(Clone, Debug, Default)]
pub struct GenericHook;

impl HookInterpreter for GenericHook {
    fn interpret(&self, request: &WebhookRequest, config: &HookConfig) -> Result<(), HookRejection> {
        verify_signature(request, config.secret.as_deref())?;

        let payload: GenericPayload = serde_json::from_slice(&request.body)
            .map_err(|err| HookRejection::bad_request(&format!("invalid body: {err}")))?;
        let repository = &config.repository;
        let reference = payload.reference;

        if reference.starts_with("refs/heads/") {
            if reference != repository.reference_name {
                return Err(HookRejection::bad_request(&format!(
                    "event: push to branch {reference}"
                )));
            }
        } else if reference.starts_with("refs/tags/") {
            if !repository.latest_tag && reference != repository.reference_name {
                return Err(HookRejection::bad_request(&format!(
                    "event: push to tag {reference}"
                )));
            }
        } else {
            return Err(HookRejection::bad_request(&format!(
                "{reference} is neither a tag or a branch"
            )));
        }

        Ok(())
    }
}

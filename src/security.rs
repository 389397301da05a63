#![forbid(unsafe_code)]

//! Shared security helpers used by the vidshare binaries.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Shared secret guarding the administrative duplicate-review routes.
///
/// Only the BLAKE3 digest is kept in memory, and digests are compared with
/// `blake3::Hash`'s constant-time equality.
#[derive(Clone)]
pub struct AdminToken {
    digest: blake3::Hash,
}

impl AdminToken {
    /// Returns `None` for blank secrets so an empty env var never opens the
    /// admin surface.
    pub fn new(secret: &str) -> Option<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            digest: blake3::hash(secret.as_bytes()),
        })
    }

    pub fn verify(&self, presented: &str) -> bool {
        blake3::hash(presented.trim().as_bytes()) == self.digest
    }

    /// Checks an `Authorization` header value of the form `Bearer <token>`.
    pub fn verify_bearer(&self, header_value: &str) -> bool {
        let Some((scheme, token)) = header_value.trim().split_once(' ') else {
            return false;
        };
        scheme.eq_ignore_ascii_case("bearer") && self.verify(token)
    }
}

impl std::fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AdminToken(..)")
    }
}
